use super::{Item, Key, SortKey};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The write retry budget ran out with items still unprocessed. Everything else in the call
    /// may already have landed.
    #[error("batch write throttled: {} items still unprocessed after exhausting retries", .unprocessed.len())]
    ThrottledWrite { unprocessed: Vec<Item> },

    /// The read retry budget ran out with keys still unresolved.
    #[error("batch get exhausted its retries with {} keys unresolved", .keys.len())]
    BatchGetExhausted { keys: Vec<Key> },

    /// The store returned a continuation key that doesn't advance past the current watermark.
    #[error("range query for partition {pk:?} stalled at sort key {watermark}")]
    StalledPage { pk: String, watermark: SortKey },

    /// The item carries `PK` and `SK` attributes, but they can't address anything: the partition
    /// key isn't a string or the sort key isn't a number.
    #[error("item has unusable key attributes: PK {:?}, SK {:?}", .item.get(crate::PARTITION_KEY), .item.get(crate::SORT_KEY))]
    InvalidKey { item: Item },

    #[error(transparent)]
    Store(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<simple_error::SimpleError> for Error {
    fn from(e: simple_error::SimpleError) -> Self {
        Self::Store(Box::new(e))
    }
}

impl Error {
    pub fn is_throttled_write(&self) -> bool {
        matches!(self, Self::ThrottledWrite { .. })
    }

    pub fn is_batch_get_exhausted(&self) -> bool {
        matches!(self, Self::BatchGetExhausted { .. })
    }
}
