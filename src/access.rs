use super::{Config, Item, Key, Result, StoreClient};

/// Batching, deduplication, pagination and retry layered over a `StoreClient`.
///
/// The operations themselves live alongside their helpers: see `writer`, `reader`, `pager` and
/// `deleter`.
pub struct BatchedStoreAccess<C> {
    pub(crate) client: C,
    pub(crate) config: Config,
}

impl<C: StoreClient> BatchedStoreAccess<C> {
    pub fn new(client: C, config: Config) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_inner(self) -> C {
        self.client
    }

    #[tracing::instrument(skip_all, fields(table = %self.config.table_name, key = ?key, otel.status_code, error.msg))]
    pub async fn get(&self, key: &Key) -> Result<Option<Item>> {
        self.client.get(&self.config.table_name, key, self.config.consistent_reads).await
    }

    #[tracing::instrument(skip_all, fields(table = %self.config.table_name, otel.status_code, error.msg))]
    pub async fn put(&self, item: Item) -> Result<()> {
        self.client.put(&self.config.table_name, item).await
    }
}
