use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::observability;
use crate::store::MemoryStore;

/// Compact the store's journal once `threshold` appends have piled up
/// since the last compaction. Checks every `period`.
pub async fn run_compactor(store: Arc<MemoryStore>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        compact_if_due(&store, threshold).await;
    }
}

/// One compactor pass. Returns true if the journal was rewritten.
pub async fn compact_if_due(store: &MemoryStore, threshold: u64) -> bool {
    let appends = store.journal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    debug!("{appends} journal appends since last compaction, compacting");
    match store.compact_journal().await {
        Ok(()) => {
            metrics::counter!(observability::JOURNAL_COMPACTIONS_TOTAL).increment(1);
            true
        }
        Err(e) => {
            warn!("journal compaction failed: {e}");
            false
        }
    }
}
