//! Sketch bin representation.

/// A sketch bin.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Bin {
    /// The bin index.
    pub(crate) k: i16,

    /// The number of observations within the bin.
    pub(crate) n: u64,
}

impl Bin {
    /// Returns the key of the bin.
    pub fn key(&self) -> i32 {
        i32::from(self.k)
    }

    /// Returns the number of observations within the bin.
    pub fn count(&self) -> u64 {
        self.n
    }

    pub(crate) fn increment(&mut self, n: u64) {
        self.n = self.n.saturating_add(n);
    }
}
