use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::{Certificate, Client, StatusCode};

use crate::analytics::models::Row;
use metrica_common::error::{MetricaError, MetricaResult};

#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    /// Base URL of the HTTP interface, e.g. `https://ch.example.com:8443`.
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub verify_tls: bool,
    /// PEM file added as an extra trusted root.
    pub ca_cert_path: Option<String>,
    pub timeout_secs: u64,
}

/// Thin client over the ClickHouse HTTP interface.
///
/// The client starts disconnected. [`ClickHouseClient::connect`] verifies the
/// server with `SELECT 1`; every query or insert issued before that (or after
/// [`ClickHouseClient::disconnect`]) fails with `StorageUnavailable`.
pub struct ClickHouseClient {
    http: Client,
    config: ClickHouseConfig,
    connected: AtomicBool,
}

enum Failure {
    Transport(reqwest::Error),
    Status { status: StatusCode, body: String },
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "request failed: {e}"),
            Self::Status { status, body } => write!(f, "HTTP {status}: {}", body.trim()),
        }
    }
}

impl ClickHouseClient {
    pub fn new(config: ClickHouseConfig) -> MetricaResult<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_tls);

        if let Some(path) = &config.ca_cert_path {
            let pem = std::fs::read(path).map_err(|e| {
                MetricaError::Config(format!("cannot read ClickHouse CA cert {path}: {e}"))
            })?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| MetricaError::Config(format!("invalid ClickHouse CA cert: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder
            .build()
            .map_err(|e| MetricaError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            connected: AtomicBool::new(false),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Verify the server answers `SELECT 1` and mark the client connected.
    pub async fn connect(&self) -> MetricaResult<()> {
        let body = self
            .send(None, "SELECT 1 AS probe FORMAT JSONEachRow".to_string())
            .await
            .map_err(|e| {
                tracing::error!(url = %self.config.url, error = %e, "clickhouse connection failed");
                MetricaError::StorageUnavailable(e.to_string())
            })?;

        let rows = parse_json_each_row(&body).map_err(MetricaError::StorageUnavailable)?;
        let ok = rows
            .first()
            .and_then(|r| r.get("probe"))
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            == Some(1);

        if !ok {
            return Err(MetricaError::StorageUnavailable(format!(
                "unexpected connectivity probe response: {}",
                body.trim()
            )));
        }

        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(url = %self.config.url, database = %self.config.database, "connected to clickhouse");
        Ok(())
    }

    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::info!(url = %self.config.url, "clickhouse connection closed");
        }
    }

    /// Run a read query. `sql` must end with `FORMAT JSONEachRow`.
    pub async fn query_rows(&self, sql: &str) -> MetricaResult<Vec<Row>> {
        self.ensure_connected()?;

        let body = self.send(None, sql.to_string()).await.map_err(|e| {
            tracing::error!(sql, error = %e, "clickhouse query failed");
            MetricaError::Query(e.to_string())
        })?;

        parse_json_each_row(&body).map_err(MetricaError::Query)
    }

    /// Bulk insert `rows` into a fully qualified table as a single request.
    pub async fn insert_json_rows(&self, qualified_table: &str, rows: &[Row]) -> MetricaResult<()> {
        self.ensure_connected()?;

        let mut payload = String::new();
        for row in rows {
            let line = serde_json::to_string(row)
                .map_err(|e| MetricaError::StorageWrite(format!("cannot encode row: {e}")))?;
            payload.push_str(&line);
            payload.push('\n');
        }

        let statement = format!("INSERT INTO {qualified_table} FORMAT JSONEachRow");
        self.send(Some(&statement), payload).await.map_err(|e| {
            tracing::error!(table = qualified_table, error = %e, "clickhouse insert failed");
            MetricaError::StorageWrite(e.to_string())
        })?;

        Ok(())
    }

    fn ensure_connected(&self) -> MetricaResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MetricaError::StorageUnavailable(
                "clickhouse connection is not established".to_string(),
            ))
        }
    }

    /// POST to the HTTP interface. With `query` set the statement travels in
    /// the URL and `body` carries the data; otherwise `body` is the statement.
    async fn send(&self, query: Option<&str>, body: String) -> Result<String, Failure> {
        let mut request = self
            .http
            .post(format!("{}/", self.config.url.trim_end_matches('/')))
            .header("X-ClickHouse-User", &self.config.user)
            .header("X-ClickHouse-Key", &self.config.password)
            .header("X-ClickHouse-Database", &self.config.database);

        if let Some(q) = query {
            request = request.query(&[("query", q)]);
        }

        let response = request.body(body).send().await.map_err(Failure::Transport)?;
        let status = response.status();
        let text = response.text().await.map_err(Failure::Transport)?;

        if status.is_success() {
            Ok(text)
        } else {
            Err(Failure::Status { status, body: text })
        }
    }
}

/// Parse a `JSONEachRow` response: one JSON object per non-empty line.
fn parse_json_each_row(body: &str) -> Result<Vec<Row>, String> {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str::<Row>(l).map_err(|e| format!("malformed row {l:?}: {e}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: &str) -> ClickHouseConfig {
        ClickHouseConfig {
            url: url.to_string(),
            user: "loader".to_string(),
            password: "secret".to_string(),
            database: "analytics".to_string(),
            verify_tls: true,
            ca_cert_path: None,
            timeout_secs: 5,
        }
    }

    async fn mount_ping(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_string_contains("SELECT 1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"probe\":1}\n"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn connect_sends_credentials_and_marks_connected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("X-ClickHouse-User", "loader"))
            .and(header("X-ClickHouse-Key", "secret"))
            .and(header("X-ClickHouse-Database", "analytics"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"probe\":1}\n"))
            .expect(1)
            .mount(&server)
            .await;

        let client = ClickHouseClient::new(test_config(&server.uri())).unwrap();
        assert!(!client.is_connected());

        client.connect().await.expect("should connect");
        assert!(client.is_connected());

        client.disconnect();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn connect_fails_on_server_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(516).set_body_string("Authentication failed"))
            .mount(&server)
            .await;

        let client = ClickHouseClient::new(test_config(&server.uri())).unwrap();
        let err = client.connect().await.unwrap_err();
        match err {
            MetricaError::StorageUnavailable(msg) => {
                assert!(msg.contains("Authentication failed"), "got: {msg}")
            }
            other => panic!("expected StorageUnavailable, got: {other:?}"),
        }
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn query_before_connect_is_unavailable() {
        let server = MockServer::start().await;

        let client = ClickHouseClient::new(test_config(&server.uri())).unwrap();
        let err = client
            .query_rows("SELECT 1 FORMAT JSONEachRow")
            .await
            .unwrap_err();
        assert!(matches!(err, MetricaError::StorageUnavailable(_)));

        let received = server.received_requests().await.unwrap_or_default();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn query_rows_parses_each_line() {
        let server = MockServer::start().await;
        mount_ping(&server).await;

        Mock::given(method("POST"))
            .and(body_string_contains("FROM t"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("{\"a\":1}\n{\"a\":2}\n\n"),
            )
            .mount(&server)
            .await;

        let client = ClickHouseClient::new(test_config(&server.uri())).unwrap();
        client.connect().await.unwrap();

        let rows = client
            .query_rows("SELECT a FROM t FORMAT JSONEachRow")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["a"], 2);
    }

    #[tokio::test]
    async fn query_error_maps_to_query_variant() {
        let server = MockServer::start().await;
        mount_ping(&server).await;

        Mock::given(method("POST"))
            .and(body_string_contains("missing_table"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_string("Code: 60. DB::Exception: Table missing_table does not exist"),
            )
            .mount(&server)
            .await;

        let client = ClickHouseClient::new(test_config(&server.uri())).unwrap();
        client.connect().await.unwrap();

        let err = client
            .query_rows("SELECT count() FROM missing_table FORMAT JSONEachRow")
            .await
            .unwrap_err();
        match err {
            MetricaError::Query(msg) => assert!(msg.contains("does not exist"), "got: {msg}"),
            other => panic!("expected Query, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn insert_sends_statement_in_url_and_rows_in_body() {
        let server = MockServer::start().await;
        mount_ping(&server).await;

        Mock::given(method("POST"))
            .and(query_param(
                "query",
                "INSERT INTO analytics.events FORMAT JSONEachRow",
            ))
            .and(body_string("{\"id\":1}\n{\"id\":2}\n"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = ClickHouseClient::new(test_config(&server.uri())).unwrap();
        client.connect().await.unwrap();

        let rows: Vec<Row> = vec![
            serde_json::from_str("{\"id\":1}").unwrap(),
            serde_json::from_str("{\"id\":2}").unwrap(),
        ];
        client
            .insert_json_rows("analytics.events", &rows)
            .await
            .expect("insert should succeed");
    }

    #[tokio::test]
    async fn insert_failure_maps_to_storage_write() {
        let server = MockServer::start().await;
        mount_ping(&server).await;

        Mock::given(method("POST"))
            .and(query_param(
                "query",
                "INSERT INTO analytics.events FORMAT JSONEachRow",
            ))
            .respond_with(ResponseTemplate::new(500).set_body_string("Cannot parse input"))
            .mount(&server)
            .await;

        let client = ClickHouseClient::new(test_config(&server.uri())).unwrap();
        client.connect().await.unwrap();

        let rows: Vec<Row> = vec![serde_json::from_str("{\"id\":1}").unwrap()];
        let err = client
            .insert_json_rows("analytics.events", &rows)
            .await
            .unwrap_err();
        assert!(matches!(err, MetricaError::StorageWrite(_)));
    }

    #[test]
    fn missing_ca_cert_is_config_error() {
        let mut config = test_config("http://localhost:8123");
        config.ca_cert_path = Some("/nonexistent/ca.crt".to_string());
        let err = ClickHouseClient::new(config).err().expect("should fail");
        assert!(matches!(err, MetricaError::Config(_)));
    }

    #[test]
    fn parse_json_each_row_rejects_garbage() {
        assert!(parse_json_each_row("not json").is_err());
        assert!(parse_json_each_row("").unwrap().is_empty());
    }
}
