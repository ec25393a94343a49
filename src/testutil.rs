use crate::{memorystore::MemoryStore, BatchGetOutput, BatchWriteOutput, Item, Key, Keyed, Page, RangeQuery, Result, StoreClient};
use std::sync::Mutex;

/// How a `ThrottlingStore` declines batch requests.
#[derive(Clone, Debug)]
pub enum Throttle {
    Never,
    /// Every batch call processes nothing.
    Always,
    /// The first `n` batch calls of each kind process nothing.
    FirstCalls(usize),
    /// These keys are never processed.
    Keys(Vec<Key>),
    /// Only the first half of each batch is processed.
    Half,
}

#[derive(Default)]
pub struct Calls {
    pub batch_writes: Vec<usize>,
    pub batch_gets: Vec<usize>,
    pub deletes: Vec<Key>,
    pub queries: Vec<RangeQuery>,
}

/// Wraps a memory store, declining batch entries according to its `Throttle` and recording
/// every call it receives.
pub struct ThrottlingStore {
    pub inner: MemoryStore,
    throttle: Throttle,
    calls: Mutex<Calls>,
}

impl ThrottlingStore {
    pub fn new(throttle: Throttle) -> Self {
        Self::wrap(MemoryStore::new(), throttle)
    }

    pub fn wrap(inner: MemoryStore, throttle: Throttle) -> Self {
        Self {
            inner,
            throttle,
            calls: Mutex::default(),
        }
    }

    pub fn calls<T, F: FnOnce(&Calls) -> T>(&self, f: F) -> T {
        f(&self.calls.lock().unwrap())
    }

    fn split<T: Keyed>(&self, call: usize, entries: Vec<T>) -> (Vec<T>, Vec<T>) {
        match &self.throttle {
            Throttle::Never => (entries, vec![]),
            Throttle::Always => (vec![], entries),
            Throttle::FirstCalls(n) if call < *n => (vec![], entries),
            Throttle::FirstCalls(_) => (entries, vec![]),
            Throttle::Keys(keys) => entries.into_iter().partition(|e| !e.key().map_or(false, |k| keys.contains(&k))),
            Throttle::Half => {
                let mut processed = entries;
                let declined = processed.split_off((processed.len() + 1) / 2);
                (processed, declined)
            }
        }
    }
}

#[async_trait]
impl StoreClient for ThrottlingStore {
    async fn get(&self, table: &str, key: &Key, consistent_read: bool) -> Result<Option<Item>> {
        self.inner.get(table, key, consistent_read).await
    }

    async fn put(&self, table: &str, item: Item) -> Result<()> {
        self.inner.put(table, item).await
    }

    async fn query(&self, table: &str, query: &RangeQuery) -> Result<Page> {
        self.calls.lock().unwrap().queries.push(query.clone());
        self.inner.query(table, query).await
    }

    async fn delete(&self, table: &str, key: &Key) -> Result<()> {
        self.calls.lock().unwrap().deletes.push(key.clone());
        self.inner.delete(table, key).await
    }

    async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<BatchWriteOutput> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.batch_writes.push(items.len());
            calls.batch_writes.len() - 1
        };
        let (processed, unprocessed_items) = self.split(call, items);
        if !processed.is_empty() {
            self.inner.batch_write(table, processed).await?;
        }
        Ok(BatchWriteOutput { unprocessed_items })
    }

    async fn batch_get(&self, table: &str, keys: Vec<Key>, consistent_read: bool) -> Result<BatchGetOutput> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.batch_gets.push(keys.len());
            calls.batch_gets.len() - 1
        };
        let (processed, unprocessed_keys) = self.split(call, keys);
        let responses = match processed.is_empty() {
            true => vec![],
            false => self.inner.batch_get(table, processed, consistent_read).await?.responses,
        };
        Ok(BatchGetOutput { responses, unprocessed_keys })
    }
}
