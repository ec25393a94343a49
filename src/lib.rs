#[macro_use]
extern crate async_trait;
extern crate simple_error;

use std::collections::HashMap;

pub mod access;
pub mod config;
pub mod dedupe;
pub mod deleter;
pub mod error;
pub mod memorystore;
pub mod pager;
pub mod reader;
pub mod sortkey;
pub mod storetest;
pub mod writer;

#[cfg(feature = "aws-sdk")]
pub mod aws_sdk_dynamodbstore;

#[cfg(test)]
mod testutil;

pub use access::BatchedStoreAccess;
pub use config::{Config, WriteRetryPolicy};
pub use deleter::DeleteOutcome;
pub use error::Error;
pub use sortkey::SortKey;
pub use writer::WriteOutcome;

pub type Result<T> = std::result::Result<T, Error>;

/// The attribute holding an item's partition key.
pub const PARTITION_KEY: &str = "PK";

/// The attribute holding an item's numeric sort key.
pub const SORT_KEY: &str = "SK";

/// The most put requests the store accepts in a single batch write.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// The most keys the store accepts in a single batch get.
pub const MAX_BATCH_GET_KEYS: usize = 100;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    S(String),
    /// Numbers are carried as decimal strings, the way the store transmits them.
    N(String),
    B(Vec<u8>),
    Ss(Vec<String>),
    Ns(Vec<String>),
    Bs(Vec<Vec<u8>>),
    L(Vec<Value>),
    M(HashMap<String, Value>),
}

impl Value {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_n<T: std::str::FromStr>(&self) -> Option<T> {
        match self {
            Self::N(n) => n.parse().ok(),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::S(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::S(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::B(v)
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::N(v.to_string())
                }
            }
        )*
    };
}

impl_from_number!(i32, i64, u32, u64, usize, f64);

impl From<SortKey> for Value {
    fn from(v: SortKey) -> Self {
        Self::N(v.to_string())
    }
}

/// Renders a key attribute so that values the store considers equal render identically.
fn canonical_key_attribute(v: &Value) -> String {
    match v {
        Value::N(n) => match n.parse::<SortKey>() {
            Ok(sk) => format!("{:?}", Value::from(sk)),
            Err(_) => format!("{:?}", v),
        },
        _ => format!("{:?}", v),
    }
}

/// An item is a map of attribute names to values. It's addressed by its `PK` (string) and `SK`
/// (number) attributes; nothing else about its shape is constrained.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Item(HashMap<String, Value>);

impl Item {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<K: Into<String>, V: Into<Value>>(mut self, name: K, value: V) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, name: K, value: V) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.0
    }

    pub fn into_attributes(self) -> HashMap<String, Value> {
        self.0
    }
}

impl From<HashMap<String, Value>> for Item {
    fn from(m: HashMap<String, Value>) -> Self {
        Self(m)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Item {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<Key> for Item {
    fn from(key: Key) -> Self {
        Item::new().with(PARTITION_KEY, key.pk).with(SORT_KEY, key.sk)
    }
}

/// Addresses exactly one item.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    pub pk: String,
    pub sk: SortKey,
}

impl Key {
    pub fn new<P: Into<String>, S: Into<SortKey>>(pk: P, sk: S) -> Self {
        Self { pk: pk.into(), sk: sk.into() }
    }
}

/// The raw `(PK, SK)` attributes of an entry, canonicalized. Two entries address the same item
/// exactly when their identities are equal and complete.
pub type KeyIdentity = (Option<String>, Option<String>);

/// Anything that may carry a `(PK, SK)` pair. Either half may be missing for loosely-shaped
/// input such as caller-supplied delete keys.
pub trait Keyed {
    fn pk(&self) -> Option<&str>;
    fn sk(&self) -> Option<SortKey>;
    fn identity(&self) -> KeyIdentity;

    /// Returns the full key if both halves are present. A sort key of zero is present.
    fn key(&self) -> Option<Key> {
        match (self.pk(), self.sk()) {
            (Some(pk), Some(sk)) => Some(Key { pk: pk.to_string(), sk }),
            _ => None,
        }
    }
}

impl Keyed for Item {
    fn pk(&self) -> Option<&str> {
        self.get(PARTITION_KEY).and_then(Value::as_s)
    }

    fn sk(&self) -> Option<SortKey> {
        self.get(SORT_KEY).and_then(Value::as_n)
    }

    fn identity(&self) -> KeyIdentity {
        (
            self.get(PARTITION_KEY).map(canonical_key_attribute),
            self.get(SORT_KEY).map(canonical_key_attribute),
        )
    }
}

impl Keyed for Key {
    fn pk(&self) -> Option<&str> {
        Some(&self.pk)
    }

    fn sk(&self) -> Option<SortKey> {
        Some(self.sk.clone())
    }

    fn identity(&self) -> KeyIdentity {
        (
            Some(canonical_key_attribute(&Value::S(self.pk.clone()))),
            Some(canonical_key_attribute(&Value::from(self.sk.clone()))),
        )
    }

    fn key(&self) -> Option<Key> {
        Some(self.clone())
    }
}

/// A range query over one partition: every item whose sort key is strictly greater than `after`,
/// in ascending sort key order.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeQuery {
    pub pk: String,
    pub after: SortKey,
    /// The most items to return in one page. The store may return fewer.
    pub limit: Option<u32>,
    pub consistent_read: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    /// Present when the store stopped before exhausting the range.
    pub last_evaluated_key: Option<Key>,
}

impl Page {
    pub fn next_watermark(&self) -> Option<SortKey> {
        self.last_evaluated_key.as_ref().map(|k| k.sk.clone())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchWriteOutput {
    pub unprocessed_items: Vec<Item>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchGetOutput {
    pub responses: Vec<Item>,
    pub unprocessed_keys: Vec<Key>,
}

/// The primitive operations of the underlying store. Every implementation is shared by reference
/// across concurrent operations, so it must multiplex requests itself.
///
/// The two batch operations may succeed partially. Anything the store declined is returned as
/// unprocessed rather than as an error.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn get(&self, table: &str, key: &Key, consistent_read: bool) -> Result<Option<Item>>;
    async fn put(&self, table: &str, item: Item) -> Result<()>;
    async fn query(&self, table: &str, query: &RangeQuery) -> Result<Page>;
    async fn delete(&self, table: &str, key: &Key) -> Result<()>;

    /// Puts at most `MAX_BATCH_WRITE_ITEMS` items with pairwise distinct keys.
    async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<BatchWriteOutput>;

    /// Gets at most `MAX_BATCH_GET_KEYS` pairwise distinct keys. Missing items are simply absent
    /// from the responses.
    async fn batch_get(&self, table: &str, keys: Vec<Key>, consistent_read: bool) -> Result<BatchGetOutput>;
}

#[async_trait]
impl<C: StoreClient + ?Sized> StoreClient for std::sync::Arc<C> {
    async fn get(&self, table: &str, key: &Key, consistent_read: bool) -> Result<Option<Item>> {
        (**self).get(table, key, consistent_read).await
    }

    async fn put(&self, table: &str, item: Item) -> Result<()> {
        (**self).put(table, item).await
    }

    async fn query(&self, table: &str, query: &RangeQuery) -> Result<Page> {
        (**self).query(table, query).await
    }

    async fn delete(&self, table: &str, key: &Key) -> Result<()> {
        (**self).delete(table, key).await
    }

    async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<BatchWriteOutput> {
        (**self).batch_write(table, items).await
    }

    async fn batch_get(&self, table: &str, keys: Vec<Key>, consistent_read: bool) -> Result<BatchGetOutput> {
        (**self).batch_get(table, keys, consistent_read).await
    }
}

pub(crate) trait ResultExt<T> {
    /// Records the error on the current span and converts it into a store error.
    fn spanify_err(self) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn spanify_err(self) -> Result<T> {
        self.map_err(|e| {
            let span = tracing::Span::current();
            span.record("otel.status_code", "ERROR");
            span.record("error.msg", tracing::field::display(&e));
            Error::Store(Box::new(e))
        })
    }
}
