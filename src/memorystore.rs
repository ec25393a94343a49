use super::{BatchGetOutput, BatchWriteOutput, Item, Key, Keyed, Page, RangeQuery, Result, MAX_BATCH_GET_KEYS, MAX_BATCH_WRITE_ITEMS};
use simple_error::SimpleError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Mutex;

type Table = BTreeMap<Key, Item>;

/// An in-memory store. It never throttles, but it validates batch requests the way the real
/// store does: oversized batches and batches addressing the same key twice are rejected.
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Table>>,
    page_size: Option<usize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            page_size: None,
        }
    }

    /// Caps every query page at `n` items, standing in for the store's response size limit.
    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = Some(n);
        self
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables.lock().unwrap().get(table).map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    fn key_of(item: &Item) -> Result<Key> {
        item.key().ok_or_else(|| SimpleError::new("item is missing its PK or SK attribute").into())
    }

    fn put(tables: &mut HashMap<String, Table>, table: &str, item: Item) -> Result<()> {
        let key = Self::key_of(&item)?;
        tables.entry(table.to_string()).or_default().insert(key, item);
        Ok(())
    }

    fn ensure_distinct<'a, I: IntoIterator<Item = &'a Key>>(keys: I) -> Result<()> {
        let mut seen = HashSet::new();
        for key in keys {
            if !seen.insert(key) {
                return Err(SimpleError::new("provided list of item keys contains duplicates").into());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl super::StoreClient for MemoryStore {
    async fn get(&self, table: &str, key: &Key, _consistent_read: bool) -> Result<Option<Item>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.get(table).and_then(|t| t.get(key)).cloned())
    }

    async fn put(&self, table: &str, item: Item) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        Self::put(&mut tables, table, item)
    }

    async fn query(&self, table: &str, query: &RangeQuery) -> Result<Page> {
        let tables = self.tables.lock().unwrap();
        let t = match tables.get(table) {
            Some(t) => t,
            None => return Ok(Page::default()),
        };

        let limit = match (query.limit.map(|n| n as usize), self.page_size) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let start = Key::new(query.pk.clone(), query.after.clone());
        let matches = t
            .range((Excluded(start), Unbounded))
            .take_while(|(k, _)| k.pk == query.pk)
            .map(|(_, v)| v.clone());

        let items: Vec<_> = match limit {
            Some(n) => matches.take(n).collect(),
            None => matches.collect(),
        };

        // like the real store, a full page always carries a continuation key, even if it
        // happens to end exactly at the end of the partition
        let last_evaluated_key = match limit {
            Some(n) if n > 0 && items.len() == n => items.last().and_then(|item| item.key()),
            _ => None,
        };

        Ok(Page { items, last_evaluated_key })
    }

    async fn delete(&self, table: &str, key: &Key) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(t) = tables.get_mut(table) {
            t.remove(key);
        }
        Ok(())
    }

    async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<BatchWriteOutput> {
        if items.is_empty() || items.len() > MAX_BATCH_WRITE_ITEMS {
            return Err(SimpleError::new(format!("batch writes must contain between 1 and {} items", MAX_BATCH_WRITE_ITEMS)).into());
        }
        let keys = items.iter().map(Self::key_of).collect::<Result<Vec<_>>>()?;
        Self::ensure_distinct(&keys)?;

        let mut tables = self.tables.lock().unwrap();
        for item in items {
            Self::put(&mut tables, table, item)?;
        }
        Ok(BatchWriteOutput::default())
    }

    async fn batch_get(&self, table: &str, keys: Vec<Key>, _consistent_read: bool) -> Result<BatchGetOutput> {
        if keys.is_empty() || keys.len() > MAX_BATCH_GET_KEYS {
            return Err(SimpleError::new(format!("batch gets must contain between 1 and {} keys", MAX_BATCH_GET_KEYS)).into());
        }
        Self::ensure_distinct(&keys)?;

        let tables = self.tables.lock().unwrap();
        let responses = match tables.get(table) {
            Some(t) => keys.iter().filter_map(|k| t.get(k).cloned()).collect(),
            None => vec![],
        };
        Ok(BatchGetOutput {
            responses,
            unprocessed_keys: vec![],
        })
    }
}
