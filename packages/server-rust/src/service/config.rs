use keyset_core::PaginationConfig;

/// Configuration for the list services.
///
/// Controls page-size limits and how long a single page call (page query plus
/// count) may run.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Page-size limits applied by the normalizer.
    pub pagination: PaginationConfig,
    /// Deadline for one page call in milliseconds. `0` disables it.
    pub query_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            pagination: PaginationConfig::default(),
            query_timeout_ms: 10_000,
        }
    }
}
