/// Generates a conformance suite for a `StoreClient`. The argument is a closure returning a
/// future that resolves to a fresh, empty store.
#[macro_export]
macro_rules! test_store {
    ($f:expr) => {
        use $crate::{Item, Key, RangeQuery, StoreClient, PARTITION_KEY, SORT_KEY};

        const TABLE: &str = "StoreTest";

        fn item(pk: &str, sk: i64) -> Item {
            Item::new().with(PARTITION_KEY, pk).with(SORT_KEY, sk)
        }

        fn range(pk: &str, after: i64) -> RangeQuery {
            RangeQuery {
                pk: pk.to_string(),
                after: after.into(),
                limit: None,
                consistent_read: true,
            }
        }

        #[tokio::test]
        #[serial_test::serial]
        async fn test_put() {
            let s = ($f)().await;

            s.put(TABLE, item("foo", 1).with("v", "bar")).await.unwrap();
            assert_eq!(s.get(TABLE, &Key::new("foo", 1), true).await.unwrap(), Some(item("foo", 1).with("v", "bar")));
            assert_eq!(s.get(TABLE, &Key::new("foo", 2), true).await.unwrap(), None);

            s.put(TABLE, item("foo", 1).with("v", "baz")).await.unwrap();
            assert_eq!(s.get(TABLE, &Key::new("foo", 1), true).await.unwrap(), Some(item("foo", 1).with("v", "baz")));
        }

        #[tokio::test]
        #[serial_test::serial]
        async fn test_delete() {
            let s = ($f)().await;

            s.delete(TABLE, &Key::new("foo", 0)).await.unwrap();

            s.put(TABLE, item("foo", 0)).await.unwrap();
            assert!(s.get(TABLE, &Key::new("foo", 0), true).await.unwrap().is_some());

            s.delete(TABLE, &Key::new("foo", 0)).await.unwrap();
            assert_eq!(s.get(TABLE, &Key::new("foo", 0), true).await.unwrap(), None);
        }

        #[tokio::test]
        #[serial_test::serial]
        async fn test_query() {
            let s = ($f)().await;

            for sk in [8, 1, 5, 3, 2] {
                s.put(TABLE, item("foo", sk)).await.unwrap();
            }
            s.put(TABLE, item("bar", 4)).await.unwrap();

            let page = s.query(TABLE, &range("foo", -1)).await.unwrap();
            assert_eq!(page.items.iter().map(|i| i.get(SORT_KEY).and_then(|v| v.as_n()).unwrap()).collect::<Vec<i64>>(), vec![1, 2, 3, 5, 8]);
            assert_eq!(page.last_evaluated_key, None);

            let page = s.query(TABLE, &range("foo", 3)).await.unwrap();
            assert_eq!(page.items, vec![item("foo", 5), item("foo", 8)]);

            let page = s.query(TABLE, &range("baz", -1)).await.unwrap();
            assert!(page.items.is_empty());
            assert_eq!(page.last_evaluated_key, None);
        }

        #[tokio::test]
        #[serial_test::serial]
        async fn test_query_limit() {
            let s = ($f)().await;

            for sk in 0..5 {
                s.put(TABLE, item("foo", sk)).await.unwrap();
            }

            let page = s.query(TABLE, &RangeQuery { limit: Some(2), ..range("foo", -1) }).await.unwrap();
            assert_eq!(page.items, vec![item("foo", 0), item("foo", 1)]);
            assert_eq!(page.last_evaluated_key, Some(Key::new("foo", 1)));
        }

        #[tokio::test]
        #[serial_test::serial]
        async fn test_batch_write() {
            let s = ($f)().await;

            let items: Vec<_> = (0..25).map(|sk| item("foo", sk).with("v", sk)).collect();
            let out = s.batch_write(TABLE, items).await.unwrap();
            assert!(out.unprocessed_items.is_empty());

            assert_eq!(s.get(TABLE, &Key::new("foo", 24), true).await.unwrap(), Some(item("foo", 24).with("v", 24)));
        }

        #[tokio::test]
        #[serial_test::serial]
        async fn test_batch_get() {
            let s = ($f)().await;

            s.put(TABLE, item("foo", 1)).await.unwrap();
            s.put(TABLE, item("foo", 2)).await.unwrap();

            let out = s.batch_get(TABLE, vec![Key::new("foo", 1), Key::new("foo", 2), Key::new("foo", 3)], true).await.unwrap();
            assert!(out.unprocessed_keys.is_empty());

            let mut got = out.responses;
            got.sort_by_key(|i| i.get(SORT_KEY).and_then(|v| v.as_n::<i64>()));
            assert_eq!(got, vec![item("foo", 1), item("foo", 2)]);
        }
    };
}
