pub mod lattice;
pub mod register;

pub use lattice::Lattice;
pub use register::{LwwRegister, Stamp};
