//! Engine tuning knobs.

/// Batch sizes for sync, iteration and mutation traffic.
///
/// The defaults match the remote service's sweet spot; tests shrink
/// them to exercise paging with small fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rows requested per page during a full sync.
    pub full_sync_page_size: usize,
    /// Rows fetched per remote call when an iterator runs past the
    /// cached portion of a dataset.
    pub scan_page_size: usize,
    /// Rows dispatched per remote call when applying a mutation.
    pub mutation_chunk_size: usize,
}

impl EngineConfig {
    /// Creates a configuration with default batch sizes.
    pub fn new() -> Self {
        EngineConfig {
            full_sync_page_size: 5000,
            scan_page_size: 1000,
            mutation_chunk_size: 1000,
        }
    }

    /// Sets the full sync page size.
    #[must_use]
    pub fn with_full_sync_page_size(mut self, size: usize) -> Self {
        self.full_sync_page_size = size.max(1);
        self
    }

    /// Sets the iterator fill page size.
    #[must_use]
    pub fn with_scan_page_size(mut self, size: usize) -> Self {
        self.scan_page_size = size.max(1);
        self
    }

    /// Sets the mutation chunk size.
    #[must_use]
    pub fn with_mutation_chunk_size(mut self, size: usize) -> Self {
        self.mutation_chunk_size = size.max(1);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.full_sync_page_size, 5000);
        assert_eq!(config.scan_page_size, 1000);
        assert_eq!(config.mutation_chunk_size, 1000);
    }

    #[test]
    fn builders_reject_zero() {
        let config = EngineConfig::new()
            .with_full_sync_page_size(0)
            .with_scan_page_size(0)
            .with_mutation_chunk_size(0);
        assert_eq!(config.full_sync_page_size, 1);
        assert_eq!(config.scan_page_size, 1);
        assert_eq!(config.mutation_chunk_size, 1);
    }
}
