use super::{dedupe::dedupe, BatchedStoreAccess, Error, Item, Key, Result, StoreClient, MAX_BATCH_GET_KEYS};
use async_recursion::async_recursion;
use futures::future::try_join_all;
use itertools::Itertools as _;
use tracing::{debug, warn};

impl<C: StoreClient> BatchedStoreAccess<C> {
    /// Gets every item addressed by `keys`, making as many passes as the configuration allows.
    /// Keys with no item are simply absent from the result.
    pub async fn batch_get(&self, keys: Vec<Key>) -> Result<Vec<Item>> {
        self.batch_get_with_retries(keys, self.config.read_retries).await
    }

    /// Like `batch_get`, with an explicit number of passes.
    ///
    /// Each pass splits the outstanding keys into store-sized chunks and requests them all
    /// concurrently. Whatever the store leaves unprocessed is requested again by the next pass,
    /// immediately and without backoff. If keys are still outstanding once the passes are used
    /// up, the whole call fails with `BatchGetExhausted`; no partial result is returned.
    ///
    /// Results come back in chunk order, with items resolved by later passes appended at the end.
    #[tracing::instrument(skip_all, fields(table = %self.config.table_name, keys = keys.len(), retries_left = retries_left, otel.status_code, error.msg))]
    pub async fn batch_get_with_retries(&self, keys: Vec<Key>, retries_left: u32) -> Result<Vec<Item>> {
        let result = self.batch_get_pass(keys, retries_left).await;
        if let Err(e) = &result {
            let span = tracing::Span::current();
            span.record("otel.status_code", "ERROR");
            span.record("error.msg", tracing::field::display(e));
        }
        result
    }

    #[async_recursion]
    async fn batch_get_pass(&self, keys: Vec<Key>, retries_left: u32) -> Result<Vec<Item>> {
        if retries_left == 0 {
            warn!(outstanding = keys.len(), "batch get ran out of retries");
            return Err(Error::BatchGetExhausted { keys });
        }

        let chunks: Vec<Vec<Key>> = keys
            .into_iter()
            .chunks(MAX_BATCH_GET_KEYS)
            .into_iter()
            .map(|chunk| dedupe(chunk.collect()))
            .collect();

        let table = &self.config.table_name;
        let consistent_read = self.config.consistent_reads;
        let outputs = try_join_all(chunks.into_iter().map(|chunk| self.client.batch_get(table, chunk, consistent_read))).await?;

        let mut items = Vec::new();
        let mut unprocessed = Vec::new();
        for output in outputs {
            items.extend(output.responses);
            unprocessed.extend(output.unprocessed_keys);
        }

        if !unprocessed.is_empty() {
            debug!(unprocessed = unprocessed.len(), retries_left = retries_left - 1, "retrying unprocessed keys");
            items.extend(self.batch_get_pass(unprocessed, retries_left - 1).await?);
        }

        Ok(items)
    }
}
