use super::{BatchedStoreAccess, Error, Item, RangeQuery, Result, SortKey, StoreClient};
use tracing::debug;

/// Sorts below every real sort key.
pub const INITIAL_WATERMARK: i64 = -1;

impl<C: StoreClient> BatchedStoreAccess<C> {
    /// Returns every item in the partition, in ascending sort key order.
    pub async fn get_historical_values(&self, pk: &str) -> Result<Vec<Item>> {
        self.get_historical_values_after(pk, INITIAL_WATERMARK).await
    }

    /// Returns every item in the partition with a sort key greater than `last_key`, in ascending
    /// sort key order.
    ///
    /// Pages are requested until the store stops returning a continuation key, each one starting
    /// strictly after the last key of the page before it.
    #[tracing::instrument(skip_all, fields(table = %self.config.table_name, pk = %pk, last_key, pages, otel.status_code, error.msg))]
    pub async fn get_historical_values_after<K: Into<SortKey>>(&self, pk: &str, last_key: K) -> Result<Vec<Item>> {
        let mut last_key = last_key.into();
        let span = tracing::Span::current();
        span.record("last_key", tracing::field::display(&last_key));
        let mut query = RangeQuery {
            pk: pk.to_string(),
            after: last_key.clone(),
            limit: self.config.query_page_limit,
            consistent_read: self.config.consistent_reads,
        };

        let mut values = Vec::new();
        let mut pages = 0;
        loop {
            let page = self.client.query(&self.config.table_name, &query).await?;
            pages += 1;
            let next = page.next_watermark();
            values.extend(page.items);

            match next {
                Some(watermark) if watermark <= last_key => {
                    let e = Error::StalledPage { pk: pk.to_string(), watermark };
                    span.record("otel.status_code", "ERROR");
                    span.record("error.msg", tracing::field::display(&e));
                    return Err(e);
                }
                Some(watermark) => {
                    debug!(%watermark, "fetching next page");
                    query.after = watermark.clone();
                    last_key = watermark;
                }
                None => break,
            }
        }

        span.record("pages", pages);
        Ok(values)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        memorystore::MemoryStore,
        testutil::{Throttle, ThrottlingStore},
        BatchGetOutput, BatchWriteOutput, Config, Key, Page, Value, PARTITION_KEY, SORT_KEY,
    };

    fn item(pk: &str, sk: i64) -> Item {
        Item::new().with(PARTITION_KEY, pk).with(SORT_KEY, sk)
    }

    fn sort_keys(items: &[Item]) -> Vec<i64> {
        items.iter().filter_map(|i| i.get(SORT_KEY).and_then(Value::as_n)).collect()
    }

    async fn seeded(page_size: usize, sort_keys: &[i64]) -> BatchedStoreAccess<ThrottlingStore> {
        let store = ThrottlingStore::wrap(MemoryStore::new().with_page_size(page_size), Throttle::Never);
        let access = BatchedStoreAccess::new(store, Config::new("t"));
        for &sk in sort_keys {
            access.put(item("a", sk)).await.unwrap();
        }
        access.put(item("b", 4)).await.unwrap();
        access
    }

    #[tokio::test]
    async fn test_two_pages() {
        let access = seeded(3, &[8, 2, 5, 1, 3]).await;

        let values = access.get_historical_values("a").await.unwrap();
        assert_eq!(sort_keys(&values), vec![1, 2, 3, 5, 8]);

        let watermarks: Vec<_> = access.client().calls(|c| c.queries.iter().map(|q| q.after.clone()).collect());
        assert_eq!(watermarks, vec![SortKey::from(-1), SortKey::from(3)]);
    }

    #[tokio::test]
    async fn test_full_last_page() {
        let access = seeded(2, &[1, 2, 3, 4]).await;

        let values = access.get_historical_values("a").await.unwrap();
        assert_eq!(sort_keys(&values), vec![1, 2, 3, 4]);

        // the second page ends exactly at the end of the partition, so one more empty page is
        // needed to learn that
        assert_eq!(access.client().calls(|c| c.queries.len()), 3);
    }

    #[tokio::test]
    async fn test_starting_watermark() {
        let access = seeded(100, &[0, 1, 2, 3]).await;
        let values = access.get_historical_values_after("a", 1).await.unwrap();
        assert_eq!(sort_keys(&values), vec![2, 3]);

        let values = access.get_historical_values("a").await.unwrap();
        assert_eq!(sort_keys(&values), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_fractional_page_boundary() {
        let store = ThrottlingStore::wrap(MemoryStore::new().with_page_size(2), Throttle::Never);
        let access = BatchedStoreAccess::new(store, Config::new("t"));
        for sk in ["0.5", "1.25", "1.5", "2"] {
            access.put(Item::new().with(PARTITION_KEY, "a").with(SORT_KEY, Value::N(sk.into()))).await.unwrap();
        }

        let values = access.get_historical_values("a").await.unwrap();
        let sks: Vec<_> = values.iter().filter_map(|i| i.get(SORT_KEY).and_then(Value::as_n::<SortKey>)).map(|sk| sk.to_string()).collect();
        assert_eq!(sks, vec!["0.5", "1.25", "1.5", "2"]);

        let watermarks: Vec<_> = access.client().calls(|c| c.queries.iter().map(|q| q.after.to_string()).collect());
        assert_eq!(watermarks, vec!["-1", "1.25", "2"]);

        let values = access.get_historical_values_after("a", "1.25".parse::<SortKey>().unwrap()).await.unwrap();
        assert_eq!(values.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_partition() {
        let access = seeded(100, &[1, 2]).await;
        assert!(access.get_historical_values("z").await.unwrap().is_empty());
        assert!(access.get_historical_values_after("a", 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_configured_page_limit() {
        let store = ThrottlingStore::new(Throttle::Never);
        let access = BatchedStoreAccess::new(store, Config::new("t").with_query_page_limit(2));
        for sk in 0..5 {
            access.put(item("a", sk)).await.unwrap();
        }

        let values = access.get_historical_values("a").await.unwrap();
        assert_eq!(sort_keys(&values), vec![0, 1, 2, 3, 4]);
        assert!(access.client().calls(|c| c.queries.iter().all(|q| q.limit == Some(2))));
        assert_eq!(access.client().calls(|c| c.queries.len()), 3);
    }

    /// Always claims there's another page starting at the same key.
    struct StalledStore;

    #[async_trait]
    impl StoreClient for StalledStore {
        async fn get(&self, _table: &str, _key: &Key, _consistent_read: bool) -> Result<Option<Item>> {
            Ok(None)
        }

        async fn put(&self, _table: &str, _item: Item) -> Result<()> {
            Ok(())
        }

        async fn query(&self, _table: &str, query: &RangeQuery) -> Result<Page> {
            Ok(Page {
                items: vec![],
                last_evaluated_key: Some(Key::new(query.pk.clone(), query.after.clone())),
            })
        }

        async fn delete(&self, _table: &str, _key: &Key) -> Result<()> {
            Ok(())
        }

        async fn batch_write(&self, _table: &str, _items: Vec<Item>) -> Result<BatchWriteOutput> {
            Ok(BatchWriteOutput::default())
        }

        async fn batch_get(&self, _table: &str, _keys: Vec<Key>, _consistent_read: bool) -> Result<BatchGetOutput> {
            Ok(BatchGetOutput::default())
        }
    }

    #[tokio::test]
    async fn test_stalled_watermark_is_an_error() {
        let access = BatchedStoreAccess::new(StalledStore, Config::new("t"));
        match access.get_historical_values("a").await {
            Err(Error::StalledPage { pk, watermark }) => {
                assert_eq!(pk, "a");
                assert_eq!(watermark, SortKey::from(INITIAL_WATERMARK));
            }
            other => panic!("expected a stalled page, got {:?}", other),
        }
    }
}
