use super::{dedupe::dedupe, BatchedStoreAccess, Error, Item, Result, StoreClient, MAX_BATCH_WRITE_ITEMS};
use futures::future::join_all;
use itertools::Itertools as _;
use tracing::{debug, warn};

/// What a batch write did with its input.
#[derive(Clone, Debug, Default, PartialEq)]
#[must_use = "a write outcome may carry dropped items"]
pub struct WriteOutcome {
    /// Items the store acknowledged.
    pub written: usize,
    /// Items still unprocessed when the retry budget ran out. Only ever non-empty when the write
    /// didn't fail on error.
    pub dropped: Vec<Item>,
    /// Duplicate keys removed from within a chunk before submission.
    pub pruned: usize,
}

impl WriteOutcome {
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }
}

struct ChunkReport {
    written: usize,
    pruned: usize,
    remaining: Vec<Item>,
}

impl<C: StoreClient> BatchedStoreAccess<C> {
    /// Upserts every item, splitting them into store-sized chunks that are written concurrently.
    ///
    /// Each chunk is retried with exponential backoff while the store reports unprocessed items.
    /// The budget is one initial attempt plus `max_retries` retries, so 7 attempts per chunk with
    /// the default policy. Once a chunk's budget is spent, its remaining items fail the call with `ThrottledWrite` if
    /// `fail_on_error` is set, or are dropped and reported in the outcome otherwise. Every chunk
    /// runs to completion either way, so a failed call may still have written most of its items.
    ///
    /// Duplicates are only pruned within a chunk. Two items with the same key in different chunks
    /// are both written, in no particular order.
    #[tracing::instrument(skip_all, fields(table = %self.config.table_name, items = items.len(), fail_on_error = fail_on_error, otel.status_code, error.msg))]
    pub async fn batch_write(&self, items: Vec<Item>, fail_on_error: bool) -> Result<WriteOutcome> {
        let chunks: Vec<Vec<Item>> = items
            .into_iter()
            .chunks(MAX_BATCH_WRITE_ITEMS)
            .into_iter()
            .map(|chunk| chunk.collect())
            .collect();

        let reports = join_all(chunks.into_iter().enumerate().map(|(i, chunk)| self.write_chunk(i, chunk))).await;

        let mut outcome = WriteOutcome::default();
        let mut first_err = None;
        for report in reports {
            match report {
                Ok(report) => {
                    outcome.written += report.written;
                    outcome.pruned += report.pruned;
                    outcome.dropped.extend(report.remaining);
                }
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }

        let span = tracing::Span::current();
        if let Some(e) = first_err {
            span.record("otel.status_code", "ERROR");
            span.record("error.msg", tracing::field::display(&e));
            return Err(e);
        }

        if !outcome.dropped.is_empty() {
            if fail_on_error {
                let e = Error::ThrottledWrite { unprocessed: outcome.dropped };
                span.record("otel.status_code", "ERROR");
                span.record("error.msg", tracing::field::display(&e));
                return Err(e);
            }
            warn!(dropped = outcome.dropped.len(), "dropping items the store never processed");
        }

        Ok(outcome)
    }

    /// Drives one chunk until the store has processed all of it or the retry budget is spent.
    /// Attempts are strictly sequential.
    async fn write_chunk(&self, chunk_index: usize, chunk: Vec<Item>) -> Result<ChunkReport> {
        let submitted = chunk.len();
        let mut pending = dedupe(chunk);
        let pruned = submitted - pending.len();
        let deduped = pending.len();

        let policy = &self.config.write_retry;
        let mut retry = 0;
        while !pending.is_empty() {
            let output = self.client.batch_write(&self.config.table_name, pending).await?;
            pending = output.unprocessed_items;
            if pending.is_empty() || retry >= policy.max_retries {
                break;
            }

            let delay = policy.jittered_backoff(retry);
            retry += 1;
            debug!(chunk = chunk_index, retry, unprocessed = pending.len(), ?delay, "retrying unprocessed items");
            tokio::time::sleep(delay).await;
        }

        Ok(ChunkReport {
            written: deduped - pending.len(),
            pruned,
            remaining: pending,
        })
    }
}
