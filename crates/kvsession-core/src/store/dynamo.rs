use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use tracing::{debug, warn};

use super::{KvClient, ScanPredicate, StoredRecord};
use crate::config::Config;
use crate::error::StoreError;

/// Partition key attribute of every session table.
const KEY_ATTR: &str = "id";

/// DynamoDB-based store. Each bucket is a table keyed by `id`.
pub struct DynamoKvClient {
    client: Client,
    endpoint: String,
}

impl DynamoKvClient {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Load AWS defaults; a non-empty `config.host` overrides the endpoint
    /// (e.g. DynamoDB Local), an empty host uses the regional endpoint.
    pub async fn from_config(config: &Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        let endpoint = if config.host.is_empty() {
            "aws".to_string()
        } else {
            let endpoint = config.endpoint();
            loader = loader.endpoint_url(&endpoint);
            endpoint
        };

        let aws_config = loader.load().await;
        Self::new(Client::new(&aws_config), endpoint)
    }

    /// Transport failures are connectivity errors; service errors mean the
    /// store answered and refused.
    fn map_err<E, R>(&self, op: &str, err: SdkError<E, R>) -> StoreError
    where
        E: std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug + Send + Sync + 'static,
    {
        match err {
            SdkError::ServiceError(_) => {
                StoreError::Backend(format!("{op}: {}", DisplayErrorContext(&err)))
            }
            _ => StoreError::Connection {
                endpoint: self.endpoint.clone(),
                message: format!("{op}: {}", DisplayErrorContext(&err)),
            },
        }
    }
}

fn parse_item(item: &HashMap<String, AttributeValue>) -> StoredRecord {
    StoredRecord {
        data: item.get("data").and_then(|v| v.as_s().ok()).cloned(),
        atime: item
            .get("atime")
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse().ok()),
    }
}

/// Filter expression, attribute names and values for a scan predicate.
fn filter_for(
    predicate: &ScanPredicate,
) -> (&'static str, HashMap<String, String>, HashMap<String, AttributeValue>) {
    match *predicate {
        ScanPredicate::Expired { cutoff } => (
            // `data` is a reserved word.
            "attribute_not_exists(atime) OR attribute_not_exists(#d) OR atime < :cutoff",
            HashMap::from([("#d".to_string(), "data".to_string())]),
            HashMap::from([(":cutoff".to_string(), AttributeValue::N(cutoff.to_string()))]),
        ),
    }
}

#[async_trait]
impl KvClient for DynamoKvClient {
    fn name(&self) -> &str {
        "dynamodb"
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(bucket)
            .key(KEY_ATTR, AttributeValue::S(key.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| self.map_err("get_item", e))?;

        Ok(output.item.as_ref().map(parse_item))
    }

    async fn put(&self, bucket: &str, key: &str, record: &StoredRecord) -> Result<bool, StoreError> {
        let mut request = self
            .client
            .put_item()
            .table_name(bucket)
            .item(KEY_ATTR, AttributeValue::S(key.to_string()));
        if let Some(data) = &record.data {
            request = request.item("data", AttributeValue::S(data.clone()));
        }
        if let Some(atime) = record.atime {
            request = request.item("atime", AttributeValue::N(atime.to_string()));
        }

        match request.send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(e)) => {
                warn!(
                    table = %bucket,
                    key = %key,
                    "DynamoDB put_item rejected: {}",
                    DisplayErrorContext(e.err())
                );
                Ok(false)
            }
            Err(e) => Err(self.map_err("put_item", e)),
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(bucket)
            .key(KEY_ATTR, AttributeValue::S(key.to_string()))
            .send()
            .await
            .map_err(|e| self.map_err("delete_item", e))?;
        Ok(())
    }

    async fn scan(&self, bucket: &str, predicate: &ScanPredicate) -> Result<Vec<String>, StoreError> {
        let (expression, names, values) = filter_for(predicate);
        let mut keys = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        let mut pages = 0u32;

        loop {
            let output = self
                .client
                .scan()
                .table_name(bucket)
                .filter_expression(expression)
                .set_expression_attribute_names(Some(names.clone()))
                .set_expression_attribute_values(Some(values.clone()))
                .projection_expression(KEY_ATTR)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| self.map_err("scan", e))?;
            pages += 1;

            for item in output.items() {
                if let Some(key) = item.get(KEY_ATTR).and_then(|v| v.as_s().ok()) {
                    keys.push(key.clone());
                }
            }

            match output.last_evaluated_key {
                Some(last) if !last.is_empty() => start_key = Some(last),
                _ => break,
            }
        }

        debug!(table = %bucket, pages, matched = keys.len(), "DynamoDB scan finished");
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_item() {
        let item = HashMap::from([
            ("id".to_string(), AttributeValue::S("s1".to_string())),
            ("data".to_string(), AttributeValue::S("Zm9v".to_string())),
            ("atime".to_string(), AttributeValue::N("1700000000".to_string())),
        ]);
        assert_eq!(parse_item(&item), StoredRecord::new("Zm9v", 1_700_000_000));
    }

    #[test]
    fn test_parse_item_missing_fields() {
        let item = HashMap::from([("id".to_string(), AttributeValue::S("s1".to_string()))]);
        assert_eq!(parse_item(&item), StoredRecord::default());
    }

    #[test]
    fn test_filter_for_expired() {
        let (expr, names, values) = filter_for(&ScanPredicate::Expired { cutoff: 1234 });
        assert!(expr.contains("atime < :cutoff"));
        assert_eq!(names.get("#d").map(String::as_str), Some("data"));
        assert_eq!(values.get(":cutoff"), Some(&AttributeValue::N("1234".to_string())));
    }
}
