//! Size Accountant Module
//!
//! Running total of entry sizes checked against an optional memory ceiling.

// == Size Accountant ==
/// Tracks the approximate memory footprint of all stored entries.
#[derive(Debug, Default, Clone)]
pub struct SizeAccountant {
    /// Sum of `size_bytes` over every stored entry
    total: u64,
    /// Ceiling in bytes, None = unbounded
    limit: Option<u64>,
}

impl SizeAccountant {
    // == Constructor ==
    pub fn new(limit: Option<u64>) -> Self {
        Self { total: 0, limit }
    }

    /// Accounts for a newly stored entry.
    pub fn add(&mut self, size: u64) {
        self.total = self.total.saturating_add(size);
    }

    /// Releases a removed entry.
    pub fn remove(&mut self, size: u64) {
        self.total = self.total.saturating_sub(size);
    }

    /// Swaps an entry's old size for its new one.
    pub fn replace(&mut self, old: u64, new: u64) {
        self.remove(old);
        self.add(new);
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn set_limit(&mut self, limit: Option<u64>) {
        self.limit = limit;
    }

    // == Is Over Budget ==
    /// True when a ceiling is configured and the total exceeds it.
    pub fn is_over_budget(&self) -> bool {
        self.limit.is_some_and(|limit| self.total > limit)
    }

    pub fn reset(&mut self) {
        self.total = 0;
    }
}
