use crate::{Keyed, ResultExt};

use super::{BatchGetOutput, BatchWriteOutput, Item, Key, Page, RangeQuery, Result, Value, PARTITION_KEY, SORT_KEY};
use aws_sdk_dynamodb::{
    client::Client,
    primitives::Blob,
    types::{
        AttributeDefinition, AttributeValue, BillingMode, ConsumedCapacity, KeySchemaElement, KeyType, KeysAndAttributes, PutRequest, ReturnConsumedCapacity,
        ScalarAttributeType, WriteRequest,
    },
};
use simple_error::SimpleError;
use std::collections::HashMap;
use tracing::{field::Empty, Span};

#[derive(Clone)]
pub struct Backend {
    pub client: Client,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn attribute_value(v: Value) -> AttributeValue {
    match v {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::S(s) => AttributeValue::S(s),
        Value::N(n) => AttributeValue::N(n),
        Value::B(b) => AttributeValue::B(Blob::new(b)),
        Value::Ss(ss) => AttributeValue::Ss(ss),
        Value::Ns(ns) => AttributeValue::Ns(ns),
        Value::Bs(bs) => AttributeValue::Bs(bs.into_iter().map(Blob::new).collect()),
        Value::L(l) => AttributeValue::L(l.into_iter().map(attribute_value).collect()),
        Value::M(m) => AttributeValue::M(m.into_iter().map(|(k, v)| (k, attribute_value(v))).collect()),
    }
}

fn value(v: AttributeValue) -> Result<Value> {
    Ok(match v {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(b),
        AttributeValue::S(s) => Value::S(s),
        AttributeValue::N(n) => Value::N(n),
        AttributeValue::B(b) => Value::B(b.into_inner()),
        AttributeValue::Ss(ss) => Value::Ss(ss),
        AttributeValue::Ns(ns) => Value::Ns(ns),
        AttributeValue::Bs(bs) => Value::Bs(bs.into_iter().map(Blob::into_inner).collect()),
        AttributeValue::L(l) => Value::L(l.into_iter().map(value).collect::<Result<_>>()?),
        AttributeValue::M(m) => Value::M(m.into_iter().map(|(k, v)| -> Result<(String, Value)> { Ok((k, value(v)?)) }).collect::<Result<_>>()?),
        v => return Err(SimpleError::new(format!("unsupported attribute value: {:?}", v)).into()),
    })
}

fn new_item(item: Item) -> HashMap<String, AttributeValue> {
    item.into_attributes().into_iter().map(|(k, v)| (k, attribute_value(v))).collect()
}

fn from_item(item: HashMap<String, AttributeValue>) -> Result<Item> {
    Ok(item
        .into_iter()
        .map(|(k, v)| -> Result<(String, Value)> { Ok((k, value(v)?)) })
        .collect::<Result<HashMap<_, _>>>()?
        .into())
}

fn composite_key(key: &Key) -> HashMap<String, AttributeValue> {
    let mut ret = HashMap::new();
    ret.insert(PARTITION_KEY.to_string(), AttributeValue::S(key.pk.clone()));
    ret.insert(SORT_KEY.to_string(), AttributeValue::N(key.sk.to_string()));
    ret
}

fn from_composite_key(key: HashMap<String, AttributeValue>) -> Result<Key> {
    from_item(key)?
        .key()
        .ok_or_else(|| SimpleError::new("store returned a key without a string PK and numeric SK").into())
}

#[async_trait]
impl super::StoreClient for Backend {
    #[tracing::instrument(skip_all, fields(table, key = ?key, consistent = consistent_read, consumed_rcu, otel.status_code, error.msg, otel.span_kind = "client"))]
    async fn get(&self, table: &str, key: &Key, consistent_read: bool) -> Result<Option<Item>> {
        let span = Span::current();
        span.record("table", table);

        let result = self
            .client
            .get_item()
            .table_name(table)
            .consistent_read(consistent_read)
            .set_key(Some(composite_key(key)))
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .spanify_err()?;

        record_rcu(&result.consumed_capacity, &span);

        result.item.map(from_item).transpose()
    }

    #[tracing::instrument(skip_all, fields(table, consumed_wcu, otel.status_code, error.msg, otel.span_kind = "client"))]
    async fn put(&self, table: &str, item: Item) -> Result<()> {
        let span = Span::current();
        span.record("table", table);

        let result = self
            .client
            .put_item()
            .table_name(table)
            .set_item(Some(new_item(item)))
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .spanify_err()?;

        record_wcu(&result.consumed_capacity, &span);

        Ok(())
    }

    #[tracing::instrument(skip_all, fields(table, pk = %query.pk, after = %query.after, consistent = query.consistent_read, consumed_rcu, otel.status_code, error.msg, otel.span_kind = "client"))]
    async fn query(&self, table: &str, query: &RangeQuery) -> Result<Page> {
        let span = Span::current();
        span.record("table", table);

        let result = self
            .client
            .query()
            .table_name(table)
            .consistent_read(query.consistent_read)
            .key_condition_expression("#pk = :pk AND #sk > :sk")
            .expression_attribute_names("#pk", PARTITION_KEY)
            .expression_attribute_names("#sk", SORT_KEY)
            .expression_attribute_values(":pk", AttributeValue::S(query.pk.clone()))
            .expression_attribute_values(":sk", AttributeValue::N(query.after.to_string()))
            .scan_index_forward(true)
            .set_limit(query.limit.map(|n| n.min(i32::MAX as u32) as i32))
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .spanify_err()?;

        record_rcu(&result.consumed_capacity, &span);

        let items = result.items.unwrap_or_default().into_iter().map(from_item).collect::<Result<Vec<_>>>()?;

        // an empty continuation key means the same as none at all
        let last_evaluated_key = match result.last_evaluated_key {
            Some(key) if !key.is_empty() => Some(from_composite_key(key)?),
            _ => None,
        };

        Ok(Page { items, last_evaluated_key })
    }

    #[tracing::instrument(skip_all, fields(table, key = ?key, consumed_wcu, otel.status_code, error.msg, otel.span_kind = "client"))]
    async fn delete(&self, table: &str, key: &Key) -> Result<()> {
        let span = Span::current();
        span.record("table", table);

        let result = self
            .client
            .delete_item()
            .table_name(table)
            .set_key(Some(composite_key(key)))
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .spanify_err()?;

        record_wcu(&result.consumed_capacity, &span);

        Ok(())
    }

    #[tracing::instrument(skip_all, fields(table, items = items.len(), unprocessed = Empty, consumed_wcu, otel.status_code, error.msg, otel.span_kind = "client"))]
    async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<BatchWriteOutput> {
        let span = Span::current();
        span.record("table", table);

        let requests = items
            .into_iter()
            .map(|item| -> Result<WriteRequest> {
                let put = PutRequest::builder().set_item(Some(new_item(item))).build().spanify_err()?;
                Ok(WriteRequest::builder().put_request(put).build())
            })
            .collect::<Result<Vec<_>>>()?;

        let result = self
            .client
            .batch_write_item()
            .request_items(table, requests)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .spanify_err()?;

        let mut cap = TotalConsumedCapacity::default();
        for c in result.consumed_capacity.iter().flatten() {
            cap.add_as_wcu(c);
        }
        cap.record_to(&span);

        // only puts are ever submitted, so only puts can come back
        let unprocessed_items = result
            .unprocessed_items
            .and_then(|mut u| u.remove(table))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| r.put_request)
            .map(|put| from_item(put.item))
            .collect::<Result<Vec<_>>>()?;

        span.record("unprocessed", unprocessed_items.len());

        Ok(BatchWriteOutput { unprocessed_items })
    }

    #[tracing::instrument(skip_all, fields(table, keys = keys.len(), unprocessed = Empty, consistent = consistent_read, consumed_rcu, otel.status_code, error.msg, otel.span_kind = "client"))]
    async fn batch_get(&self, table: &str, keys: Vec<Key>, consistent_read: bool) -> Result<BatchGetOutput> {
        let span = Span::current();
        span.record("table", table);

        let keys_and_attributes = KeysAndAttributes::builder()
            .consistent_read(consistent_read)
            .set_keys(Some(keys.iter().map(composite_key).collect()))
            .build()
            .spanify_err()?;

        let result = self
            .client
            .batch_get_item()
            .request_items(table, keys_and_attributes)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .spanify_err()?;

        let mut cap = TotalConsumedCapacity::default();
        for c in result.consumed_capacity.iter().flatten() {
            cap.add_as_rcu(c);
        }
        cap.record_to(&span);

        let responses = result
            .responses
            .and_then(|mut r| r.remove(table))
            .unwrap_or_default()
            .into_iter()
            .map(from_item)
            .collect::<Result<Vec<_>>>()?;

        let unprocessed_keys = match result.unprocessed_keys.and_then(|mut k| k.remove(table)) {
            Some(kv) => kv.keys.into_iter().map(from_composite_key).collect::<Result<Vec<_>>>()?,
            None => vec![],
        };

        span.record("unprocessed", unprocessed_keys.len());

        Ok(BatchGetOutput { responses, unprocessed_keys })
    }
}

/// Creates a table keyed by a string `PK` and a numeric `SK`, billed on demand.
pub async fn create_default_table(client: &Client, table_name: &str) -> Result<()> {
    client
        .create_table()
        .set_attribute_definitions(Some(vec![
            AttributeDefinition::builder()
                .attribute_name(PARTITION_KEY)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .spanify_err()?,
            AttributeDefinition::builder()
                .attribute_name(SORT_KEY)
                .attribute_type(ScalarAttributeType::N)
                .build()
                .spanify_err()?,
        ]))
        .set_key_schema(Some(vec![
            KeySchemaElement::builder()
                .attribute_name(PARTITION_KEY)
                .key_type(KeyType::Hash)
                .build()
                .spanify_err()?,
            KeySchemaElement::builder()
                .attribute_name(SORT_KEY)
                .key_type(KeyType::Range)
                .build()
                .spanify_err()?,
        ]))
        .table_name(table_name)
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await
        .spanify_err()?;
    Ok(())
}

/// Tracks total consumed capacity reported by a batch operation.
#[derive(Default)]
struct TotalConsumedCapacity {
    total_rcu: Option<f64>,
    total_wcu: Option<f64>,
}

impl TotalConsumedCapacity {
    fn add_as_rcu(&mut self, c: &ConsumedCapacity) {
        if let Some(rcu) = c.capacity_units {
            *self.total_rcu.get_or_insert(0.) += rcu;
        }
    }

    fn add_as_wcu(&mut self, c: &ConsumedCapacity) {
        if let Some(wcu) = c.capacity_units {
            *self.total_wcu.get_or_insert(0.) += wcu;
        }
    }

    /// Records to the given span, which must already have empty `consumed_rcu` or `consumed_wcu`
    /// attributes or recording those will do nothing.
    fn record_to(&self, span: &Span) {
        if let Some(rcu) = self.total_rcu {
            span.record("consumed_rcu", rcu);
        }
        if let Some(wcu) = self.total_wcu {
            span.record("consumed_wcu", wcu);
        }
    }
}

/// Records wcu used by a non-batch write operation to the given span.
fn record_wcu(capacity: &Option<ConsumedCapacity>, span: &Span) {
    if let Some(wcu) = capacity.as_ref().and_then(|c| c.capacity_units) {
        span.record("consumed_wcu", wcu);
    }
}

/// Records rcu used by a non-batch read operation to the given span.
fn record_rcu(capacity: &Option<ConsumedCapacity>, span: &Span) {
    if let Some(rcu) = capacity.as_ref().and_then(|c| c.capacity_units) {
        span.record("consumed_rcu", rcu);
    }
}
