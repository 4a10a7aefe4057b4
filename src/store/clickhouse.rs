//! Inference records in a ClickHouse table, over its HTTP interface.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE pr_inferences (
//!     pull_request_id UInt64,
//!     inference_id String,
//!     original_pull_request_url String,
//!     created_at DateTime DEFAULT now()
//! ) ENGINE = ReplacingMergeTree ORDER BY pull_request_id
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};

use super::{InferenceRecord, InferenceStore};
use crate::config::StoreConfig;
use crate::error::{AppError, Result};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct ClickHouseStore {
    client: Client,
    url: String,
    table: String,
}

impl ClickHouseStore {
    /// `config` must already be validated; the table name is interpolated
    /// into statements.
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            client: Client::new(),
            url: config.url.trim().to_string(),
            table: config.table.trim().to_string(),
        }
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::Store(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Store(format!("ClickHouse returned {status}: {}", body.trim())));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::Store(e.without_url().to_string()))
    }
}

#[derive(Serialize)]
struct InsertRow<'a> {
    pull_request_id: u64,
    inference_id: &'a str,
    original_pull_request_url: &'a str,
    created_at: String,
}

#[derive(Deserialize)]
struct SelectRow {
    inference_id: String,
    #[serde(deserialize_with = "u64_from_number_or_string")]
    pull_request_id: u64,
    created_at: String,
    original_pull_request_url: String,
}

/// 64-bit integers come back quoted unless
/// `output_format_json_quote_64bit_integers` is off.
fn u64_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .map_err(|e| AppError::Store(format!("Unparseable created_at {raw:?}: {e}")))
}

impl TryFrom<SelectRow> for InferenceRecord {
    type Error = AppError;

    fn try_from(row: SelectRow) -> Result<Self> {
        Ok(InferenceRecord {
            pull_request_id: row.pull_request_id,
            inference_id: row.inference_id,
            original_pull_request_url: row.original_pull_request_url,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[async_trait]
impl InferenceStore for ClickHouseStore {
    async fn insert(&self, record: &InferenceRecord) -> Result<()> {
        let row = serde_json::to_string(&InsertRow {
            pull_request_id: record.pull_request_id,
            inference_id: &record.inference_id,
            original_pull_request_url: &record.original_pull_request_url,
            created_at: record.created_at.format(DATETIME_FORMAT).to_string(),
        })?;
        let statement = format!("INSERT INTO {} FORMAT JSONEachRow", self.table);

        self.execute(
            self.client
                .post(&self.url)
                .query(&[("query", statement.as_str())])
                .body(row),
        )
        .await?;

        tracing::info!(
            table = %self.table,
            pull_request_id = record.pull_request_id,
            "Stored inference record"
        );
        Ok(())
    }

    async fn find_by_pull_request(&self, pull_request_id: u64) -> Result<Vec<InferenceRecord>> {
        let statement = format!(
            "SELECT inference_id, pull_request_id, created_at, original_pull_request_url \
             FROM {} WHERE pull_request_id = {{pull_request_id:UInt64}} \
             ORDER BY created_at FORMAT JSONEachRow",
            self.table
        );

        let body = self
            .execute(
                self.client
                    .post(&self.url)
                    .query(&[("param_pull_request_id", pull_request_id.to_string())])
                    .body(statement),
            )
            .await?;

        body.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| InferenceRecord::try_from(serde_json::from_str::<SelectRow>(line)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{body_string, body_string_contains, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(url: &str) -> ClickHouseStore {
        ClickHouseStore::new(&StoreConfig {
            url: url.to_string(),
            table: "ci.pr_inferences".to_string(),
        })
    }

    #[tokio::test]
    async fn test_insert_sends_one_json_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("query", "INSERT INTO ci.pr_inferences FORMAT JSONEachRow"))
            .and(body_string(
                r#"{"pull_request_id":777100,"inference_id":"0192f1c2-aaaa-bbbb-cccc-000000000001","original_pull_request_url":"https://github.com/octo/widgets/pull/42","created_at":"2025-03-04 05:06:07"}"#,
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let record = InferenceRecord {
            pull_request_id: 777_100,
            inference_id: "0192f1c2-aaaa-bbbb-cccc-000000000001".to_string(),
            original_pull_request_url: "https://github.com/octo/widgets/pull/42".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap(),
        };
        store(&server.uri()).insert(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_parses_rows() {
        let server = MockServer::start().await;
        let rows = concat!(
            r#"{"inference_id":"inf-1","pull_request_id":"777100","created_at":"2025-03-04 05:06:07","original_pull_request_url":"https://github.com/octo/widgets/pull/42"}"#,
            "\n",
            r#"{"inference_id":"inf-2","pull_request_id":777100,"created_at":"2025-03-04 06:00:00.250","original_pull_request_url":"https://github.com/octo/widgets/pull/42"}"#,
            "\n"
        );
        Mock::given(method("POST"))
            .and(query_param("param_pull_request_id", "777100"))
            .and(body_string_contains("FROM ci.pr_inferences WHERE pull_request_id = {pull_request_id:UInt64}"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rows))
            .expect(1)
            .mount(&server)
            .await;

        let records = store(&server.uri())
            .find_by_pull_request(777_100)
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].inference_id, "inf-1");
        assert_eq!(records[0].pull_request_id, 777_100);
        assert_eq!(
            records[0].created_at,
            Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap()
        );
        assert_eq!(records[1].inference_id, "inf-2");
    }

    #[tokio::test]
    async fn test_server_error_is_store_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(404).set_body_string("Code: 60. Table ci.pr_inferences does not exist"),
            )
            .mount(&server)
            .await;

        let err = store(&server.uri()).find_by_pull_request(1).await.unwrap_err();
        assert!(matches!(&err, AppError::Store(msg) if msg.contains("does not exist")));
    }

    /// Serves one response whose body stops short of its `Content-Length`.
    async fn truncated_body_server() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\n\r\n{\"inference_id\"")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_unreadable_body_is_store_error_not_empty() {
        let url = truncated_body_server().await;

        let result = store(&url).find_by_pull_request(777_100).await;
        assert!(matches!(result, Err(AppError::Store(_))), "got {result:?}");
    }

    #[test]
    fn test_parse_datetime_variants() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(parse_datetime("2025-03-04 05:06:07").unwrap(), expected);
        assert_eq!(parse_datetime("2025-03-04T05:06:07Z").unwrap(), expected);
        assert!(parse_datetime("yesterday").is_err());
    }
}
