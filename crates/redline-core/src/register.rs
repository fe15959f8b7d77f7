//! Lamport-stamped Last-Write-Wins register
//!
//! Every write carries a [`Stamp`]: a Lamport counter plus the writing
//! replica's id. The register keeps the value with the greatest stamp, so two
//! replicas that saw the same writes hold the same value whatever the order
//! of delivery. Per-character text attributes are stored in these registers.

use crate::lattice::Lattice;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A total order over writes: Lamport counter first, replica id as tie-break.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub lamport: u64,
    pub replica: String,
}

impl Stamp {
    pub fn new(lamport: u64, replica: impl Into<String>) -> Self {
        Self {
            lamport,
            replica: replica.into(),
        }
    }

    /// The stamp every fresh register starts from.
    pub fn zero() -> Self {
        Self::default()
    }
}

impl PartialOrd for Stamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Stamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lamport
            .cmp(&other.lamport)
            .then_with(|| self.replica.cmp(&other.replica))
    }
}

/// A Last-Write-Wins register over any ordered value.
///
/// `T` is usually an `Option<_>` so that "cleared" is itself a value that can
/// win over an older write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwRegister<T: Ord + Clone> {
    value: T,
    stamp: Stamp,
}

impl<T: Ord + Clone> LwwRegister<T> {
    /// Create a register holding `value` as written at `stamp`.
    pub fn new(value: T, stamp: Stamp) -> Self {
        Self { value, stamp }
    }

    /// Write `value` if `stamp` is newer than the current one.
    ///
    /// Returns true when the write won. An equal stamp is the same write
    /// seen twice, so it only wins if it carries a greater value.
    pub fn set(&mut self, value: T, stamp: Stamp) -> bool {
        let wins = match stamp.cmp(&self.stamp) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => value > self.value,
        };
        if wins {
            self.value = value;
            self.stamp = stamp;
        }
        wins
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Ord + Clone + Default> Default for LwwRegister<T> {
    fn default() -> Self {
        Self::new(T::default(), Stamp::zero())
    }
}

impl<T: Ord + Clone + Default> Lattice for LwwRegister<T> {
    fn bottom() -> Self {
        Self::default()
    }

    /// Keep the write with the greatest stamp; equal stamps fall back to the
    /// greater value so the result does not depend on argument order.
    fn join(&self, other: &Self) -> Self {
        let self_wins = match self.stamp.cmp(&other.stamp) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.value >= other.value,
        };

        if self_wins {
            self.clone()
        } else {
            other.clone()
        }
    }
}
