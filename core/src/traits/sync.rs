use async_trait::async_trait;

/// Idempotent resync handlers invoked by the sync queue.
#[async_trait]
pub trait SyncHandlers: Send + Sync {
    async fn sync_checkboxes(&self) -> anyhow::Result<()>;
    async fn sync_select_all_controls(&self) -> anyhow::Result<()>;
    async fn sync_active_list(&self) -> anyhow::Result<()>;
    async fn sync_category_toggle(&self, category: &str, checked: bool) -> anyhow::Result<()>;
}
