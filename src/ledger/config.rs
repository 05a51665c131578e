//! Ledger configuration options.

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// First position id. Positions live in their own id range above order ids.
    pub position_id_base: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            position_id_base: 1 << 32,
        }
    }
}
