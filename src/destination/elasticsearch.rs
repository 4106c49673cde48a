// ABOUTME: Elasticsearch bulk client - NDJSON _bulk requests over reqwest
// ABOUTME: Round-robins across configured nodes and parses per-item results

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

use super::{BulkClient, BulkItem, BulkResponse, WriteKind, WriteOp};
use crate::config::{sanitize_url, EsConfig};

pub struct ElasticsearchClient {
    client: Client,
    nodes: Vec<String>,
    next_node: usize,
    refresh: bool,
    credentials: Option<(String, Option<String>)>,
}

impl ElasticsearchClient {
    pub fn new(config: &EsConfig) -> Result<Self> {
        if config.nodes.is_empty() {
            bail!("At least one Elasticsearch node is required");
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            nodes: config
                .nodes
                .iter()
                .map(|node| node.trim_end_matches('/').to_string())
                .collect(),
            next_node: 0,
            refresh: config.refresh,
            credentials: config
                .user
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    fn bulk_url(&mut self) -> String {
        let node = &self.nodes[self.next_node % self.nodes.len()];
        self.next_node = self.next_node.wrapping_add(1);
        if self.refresh {
            format!("{}/_bulk?refresh=true", node)
        } else {
            format!("{}/_bulk", node)
        }
    }
}

impl BulkClient for ElasticsearchClient {
    async fn bulk(&mut self, ops: &[WriteOp]) -> Result<BulkResponse> {
        let body = bulk_body(ops)?;
        let url = self.bulk_url();
        debug!(
            "Sending {} operations to {}",
            ops.len(),
            sanitize_url(&url)
        );

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/x-ndjson")
            .body(body);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send bulk request to {}", sanitize_url(&url)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read bulk response body")?;
        if !status.is_success() {
            bail!("Bulk request failed with status {}: {}", status, text);
        }

        parse_response(&text)
    }
}

/// Render operations as the newline-delimited body `_bulk` expects.
fn bulk_body(ops: &[WriteOp]) -> Result<String> {
    let mut body = String::new();
    for op in ops {
        let (action, source) = match op.kind {
            WriteKind::Index => (
                json!({"index": {"_index": op.index, "_id": op.id}}),
                serde_json::to_value(&op.doc)?,
            ),
            WriteKind::Upsert => (
                json!({"update": {"_index": op.index, "_id": op.id}}),
                json!({"doc": op.doc, "doc_as_upsert": true}),
            ),
        };
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&source)?);
        body.push('\n');
    }
    Ok(body)
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    items: Vec<HashMap<String, RawItem>>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(rename = "_index", default)]
    index: String,
    #[serde(rename = "_id", default)]
    id: Option<String>,
    status: u16,
    error: Option<Value>,
}

fn parse_response(text: &str) -> Result<BulkResponse> {
    let raw: RawResponse =
        serde_json::from_str(text).context("Failed to parse bulk response")?;

    let mut items = Vec::with_capacity(raw.items.len());
    for entry in raw.items {
        let Some((action, item)) = entry.into_iter().next() else {
            bail!("Bulk response contains an empty item");
        };
        let kind = match action.as_str() {
            "index" | "create" => WriteKind::Index,
            "update" => WriteKind::Upsert,
            other => bail!("Unexpected action '{}' in bulk response", other),
        };
        items.push(BulkItem {
            kind,
            index: item.index,
            id: item.id.unwrap_or_default(),
            status: item.status,
            error: item.error.map(|e| describe_error(&e)),
        });
    }
    Ok(BulkResponse { items })
}

fn describe_error(error: &Value) -> String {
    match (
        error.get("type").and_then(Value::as_str),
        error.get("reason").and_then(Value::as_str),
    ) {
        (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
        (Some(kind), None) => kind.to_string(),
        _ => error.to_string(),
    }
}
