//! Minimal Neo4j client over the HTTP transactional endpoint.
//!
//! Each statement runs in its own auto-committed transaction
//! (`POST {base}/db/{database}/tx/commit`). Rows come back in `row` format,
//! so nodes and relationships arrive as plain property maps.

use serde_json::{json, Map, Value};

use crate::config::Neo4jConfig;

const DEFAULT_HTTP_PORT: u16 = 7474;
const DEFAULT_HTTPS_PORT: u16 = 7473;

#[derive(Debug, thiserror::Error)]
pub enum Neo4jError {
    #[error("invalid Neo4j URI {uri:?}: {message}")]
    InvalidUri { uri: String, message: String },
    #[error("failed to reach Neo4j at {url}: {message}")]
    Network { url: String, message: String },
    #[error("neo4j http error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("neo4j returned an unexpected response: {0}")]
    InvalidResponse(String),
    #[error("cypher failed ({code}): {message}")]
    Statement { code: String, message: String },
}

/// Something that can run a Cypher statement and return row objects.
pub trait CypherExecutor: Send + Sync {
    fn run(&self, statement: &str) -> Result<Vec<Value>, Neo4jError>;
}

pub struct Neo4jClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    username: String,
    password: Option<String>,
}

impl Neo4jClient {
    pub fn new(config: &Neo4jConfig) -> Result<Self, Neo4jError> {
        let base = http_base_url(&config.uri)?;
        let endpoint = format!("{base}/db/{}/tx/commit", config.database);
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| Neo4jError::Network {
                url: endpoint.clone(),
                message: format!("failed to build http client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl CypherExecutor for Neo4jClient {
    fn run(&self, statement: &str) -> Result<Vec<Value>, Neo4jError> {
        let body = json!({
            "statements": [{
                "statement": statement,
                "resultDataContents": ["row"],
            }]
        });
        let resp = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, self.password.as_deref())
            .json(&body)
            .send()
            .map_err(|e| Neo4jError::Network {
                url: self.endpoint.clone(),
                message: e.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Neo4jError::Http {
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }
        let v: Value = resp
            .json()
            .map_err(|e| Neo4jError::InvalidResponse(e.to_string()))?;
        let records = rows_to_records(&v)?;
        tracing::debug!(rows = records.len(), "cypher statement executed");
        Ok(records)
    }
}

/// Map `bolt://` and `neo4j://` style URIs onto the HTTP API of the same host.
pub fn http_base_url(uri: &str) -> Result<String, Neo4jError> {
    let invalid = |message: String| Neo4jError::InvalidUri {
        uri: uri.to_string(),
        message,
    };
    let parsed = url::Url::parse(uri.trim()).map_err(|e| invalid(e.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| invalid("missing host".to_string()))?;
    let (scheme, port) = match parsed.scheme() {
        "http" => ("http", parsed.port().unwrap_or(80)),
        "https" => ("https", parsed.port().unwrap_or(443)),
        "bolt" | "neo4j" => ("http", DEFAULT_HTTP_PORT),
        "bolt+s" | "bolt+ssc" | "neo4j+s" | "neo4j+ssc" => ("https", DEFAULT_HTTPS_PORT),
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    };
    Ok(format!("{scheme}://{host}:{port}"))
}

/// Convert a transactional-endpoint response into objects keyed by column,
/// in column order. Reported statement errors become [`Neo4jError::Statement`].
pub fn rows_to_records(response: &Value) -> Result<Vec<Value>, Neo4jError> {
    if let Some(err) = response
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errs| errs.first())
    {
        let field = |k: &str| {
            err.get(k)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        return Err(Neo4jError::Statement {
            code: field("code"),
            message: field("message"),
        });
    }

    let result = response
        .get("results")
        .and_then(Value::as_array)
        .and_then(|r| r.first())
        .ok_or_else(|| Neo4jError::InvalidResponse("missing results".to_string()))?;
    let columns: Vec<&str> = result
        .get("columns")
        .and_then(Value::as_array)
        .map(|cols| cols.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let data = result
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut records = Vec::with_capacity(data.len());
    for entry in data {
        let Some(row) = entry.get("row").and_then(Value::as_array) else {
            continue;
        };
        let mut obj = Map::new();
        for (col, value) in columns.iter().zip(row) {
            obj.insert((*col).to_string(), value.clone());
        }
        records.push(Value::Object(obj));
    }
    Ok(records)
}
