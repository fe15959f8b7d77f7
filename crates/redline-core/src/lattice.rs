//! Join-semilattice trait - the convergence contract every replicated value meets
//!
//! A join-semilattice (S, ⊔) satisfies:
//!  - Commutativity: a ⊔ b = b ⊔ a
//!  - Associativity: (a ⊔ b) ⊔ c = a ⊔ (b ⊔ c)
//!  - Idempotence:  a ⊔ a = a
//!
//! Replicas that exchange state and join it reach the same value no matter
//! in which order, or how many times, the states were delivered.

use std::cmp::Ordering;

/// The core CRDT trait. Registers, text and presence all implement this.
pub trait Lattice: Clone + PartialEq {
    /// The bottom element (identity for join)
    fn bottom() -> Self;

    /// Join operation (least upper bound)
    /// Must be commutative, associative, and idempotent
    fn join(&self, other: &Self) -> Self;

    /// Partial order derived from join: a ≤ b iff a ⊔ b = b
    fn partial_cmp_lattice(&self, other: &Self) -> Option<Ordering> {
        let joined = self.join(other);
        if &joined == self && &joined == other {
            Some(Ordering::Equal)
        } else if &joined == other {
            Some(Ordering::Less)
        } else if &joined == self {
            Some(Ordering::Greater)
        } else {
            None
        }
    }

    /// Check if self ≤ other in the lattice order
    fn leq(&self, other: &Self) -> bool {
        matches!(
            self.partial_cmp_lattice(other),
            Some(Ordering::Less) | Some(Ordering::Equal)
        )
    }

    /// Join-assign: self = self ⊔ other
    fn join_assign(&mut self, other: &Self) {
        *self = self.join(other);
    }
}
