use super::{BatchedStoreAccess, Error, Item, Key, Keyed, Result, StoreClient, PARTITION_KEY, SORT_KEY};
use futures::future::join_all;

/// What a bulk delete did with its input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteOutcome {
    /// Keys the store acknowledged deleting. Deleting an absent item is acknowledged too.
    pub deleted: Vec<Key>,
    /// Inputs skipped because they lack a `PK` or an `SK`.
    pub skipped: Vec<Item>,
}

impl<C: StoreClient> BatchedStoreAccess<C> {
    /// Deletes the item addressed by each input, concurrently. Inputs without both a `PK` and an
    /// `SK` attribute are skipped without error and listed in the outcome. A sort key of zero
    /// counts as present. An input whose key attributes are present but unusable fails with
    /// `InvalidKey`.
    ///
    /// All deletes run to completion before the first error, in input order, is returned.
    /// Acknowledged deletes aren't verified by reading them back.
    #[tracing::instrument(skip_all, fields(table = %self.config.table_name, keys = keys.len(), skipped, otel.status_code, error.msg))]
    pub async fn delete_all(&self, keys: Vec<Item>) -> Result<DeleteOutcome> {
        let mut outcome = DeleteOutcome::default();
        let mut targets = Vec::with_capacity(keys.len());
        for candidate in keys {
            if candidate.get(PARTITION_KEY).is_none() || candidate.get(SORT_KEY).is_none() {
                outcome.skipped.push(candidate);
                continue;
            }
            targets.push(candidate.key().ok_or(candidate));
        }

        let span = tracing::Span::current();
        span.record("skipped", outcome.skipped.len());

        let results = join_all(targets.into_iter().map(|target| async move {
            match target {
                Ok(key) => self.client.delete(&self.config.table_name, &key).await.map(|()| key),
                Err(item) => Err(Error::InvalidKey { item }),
            }
        }))
        .await;

        let mut first_err = None;
        for result in results {
            match result {
                Ok(key) => outcome.deleted.push(key),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => {
                span.record("otel.status_code", "ERROR");
                span.record("error.msg", tracing::field::display(&e));
                Err(e)
            }
            None => Ok(outcome),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        testutil::{Throttle, ThrottlingStore},
        Config, SortKey, Value,
    };

    fn access() -> BatchedStoreAccess<ThrottlingStore> {
        BatchedStoreAccess::new(ThrottlingStore::new(Throttle::Never), Config::new("t"))
    }

    #[tokio::test]
    async fn test_malformed_keys_are_skipped() {
        let access = access();
        access.put(Item::new().with(PARTITION_KEY, "x").with(SORT_KEY, 0)).await.unwrap();

        let keys = vec![
            Item::new().with(PARTITION_KEY, "x").with(SORT_KEY, 0),
            Item::new().with(PARTITION_KEY, "y"),
            Item::new().with(SORT_KEY, 1),
        ];
        let outcome = access.delete_all(keys).await.unwrap();

        assert_eq!(outcome.deleted, vec![Key::new("x", 0)]);
        assert_eq!(outcome.skipped, vec![Item::new().with(PARTITION_KEY, "y"), Item::new().with(SORT_KEY, 1)]);
        assert_eq!(access.client().calls(|c| c.deletes.clone()), vec![Key::new("x", 0)]);
        assert!(access.client().inner.is_empty("t"));
    }

    #[tokio::test]
    async fn test_non_integer_sort_keys_are_deleted() {
        let access = access();
        let sk = |n: &str| Item::new().with(PARTITION_KEY, "a").with(SORT_KEY, Value::N(n.into()));
        for n in ["1.5", "9223372036854775808"] {
            access.put(sk(n)).await.unwrap();
        }

        let outcome = access.delete_all(vec![sk("1.5"), sk("9223372036854775808")]).await.unwrap();
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.deleted, vec![Key::new("a", "1.5".parse::<SortKey>().unwrap()), Key::new("a", "9223372036854775808".parse::<SortKey>().unwrap())]);
        assert!(access.client().inner.is_empty("t"));
    }

    #[tokio::test]
    async fn test_present_but_unusable_keys_fail() {
        let access = access();
        access.put(Item::new().with(PARTITION_KEY, "a").with(SORT_KEY, 2)).await.unwrap();

        let bad = Item::new().with(PARTITION_KEY, "a").with(SORT_KEY, "1");
        match access.delete_all(vec![bad.clone(), Item::from(Key::new("a", 2))]).await {
            Err(Error::InvalidKey { item }) => assert_eq!(item, bad),
            other => panic!("expected an invalid key, got {:?}", other),
        }

        // the usable key was still deleted
        assert_eq!(access.client().calls(|c| c.deletes.clone()), vec![Key::new("a", 2)]);
        assert!(access.client().inner.is_empty("t"));
    }

    #[tokio::test]
    async fn test_deletes_everything() {
        let access = access();
        for sk in 0..10 {
            access.put(Item::new().with(PARTITION_KEY, "a").with(SORT_KEY, sk)).await.unwrap();
        }

        let keys = (0..10).map(|sk| Item::from(Key::new("a", sk))).collect();
        let outcome = access.delete_all(keys).await.unwrap();
        assert_eq!(outcome.deleted.len(), 10);
        assert!(outcome.skipped.is_empty());
        assert!(access.client().inner.is_empty("t"));
    }

    #[tokio::test]
    async fn test_absent_items() {
        let access = access();
        let outcome = access.delete_all(vec![Item::from(Key::new("a", 1))]).await.unwrap();
        assert_eq!(outcome.deleted, vec![Key::new("a", 1)]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let access = access();
        assert_eq!(access.delete_all(vec![]).await.unwrap(), DeleteOutcome::default());
    }
}
