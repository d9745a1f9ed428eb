//! W&B run registry over the public GraphQL API.
//!
//! - Run listing pages through the `runs` connection (`filters` is passed
//!   through verbatim as W&B's MongoDB-style query document)
//! - History uses `history(samples:)` for all keys, or
//!   `sampledHistory(specs:)` when keys are given (`_step` always added)
//! - Transient failures (408, 429, 5xx, connect errors, timeouts) are
//!   retried with exponential backoff

use super::{HistoryRequest, RunDescriptor, RunRegistry};
use crate::config::RegistryConfig;
use crate::table::{Record, STEP};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::time::sleep;

/// Runs requested per page of the `runs` connection.
const PAGE_SIZE: usize = 50;

const BASE_DELAY_MS: u64 = 100;
const MAX_DELAY_MS: u64 = 5_000;

const RUNS_QUERY: &str = r"
query Runs($project: String!, $entity: String!, $cursor: String, $perPage: Int, $filters: JSONString) {
  project(name: $project, entityName: $entity) {
    runs(filters: $filters, after: $cursor, first: $perPage) {
      edges { node { name displayName group config createdAt } }
      pageInfo { endCursor hasNextPage }
    }
  }
}";

const HISTORY_QUERY: &str = r"
query RunHistory($project: String!, $entity: String!, $name: String!, $samples: Int) {
  project(name: $project, entityName: $entity) {
    run(name: $name) { history(samples: $samples) }
  }
}";

const SAMPLED_HISTORY_QUERY: &str = r"
query RunSampledHistory($project: String!, $entity: String!, $name: String!, $specs: [JSONString!]!) {
  project(name: $project, entityName: $entity) {
    run(name: $name) { sampledHistory(specs: $specs) }
  }
}";

/// Registry backed by the W&B GraphQL endpoint `{base_url}/graphql`.
#[derive(Debug, Clone)]
pub struct WandbRegistry {
    client: Client,
    config: RegistryConfig,
}

impl WandbRegistry {
    /// Create a registry client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    /// Create a registry client configured from the environment.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn from_env() -> Result<Self> {
        Self::new(RegistryConfig::from_env())
    }

    /// Registry configuration in use.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/graphql", self.config.base_url.trim_end_matches('/'))
    }

    /// POST one GraphQL query, returning its `data` object.
    async fn query(&self, query: &str, variables: Value) -> Result<Value> {
        let body = json!({ "query": query, "variables": variables });
        let mut attempt = 0;

        loop {
            let mut request = self.client.post(self.endpoint()).json(&body);
            if let Some(key) = &self.config.api_key {
                request = request.basic_auth("api", Some(key));
            }

            let retryable = match request.send().await {
                Ok(response) if response.status().is_success() => {
                    let payload: Value = response.json().await?;
                    return graphql_data(payload);
                }
                Ok(response) => {
                    let status = response.status();
                    if !is_retryable_status(status) {
                        return Err(Error::Registry(format!(
                            "{} returned {status}",
                            self.endpoint()
                        )));
                    }
                    Error::Registry(format!("{} returned {status}", self.endpoint()))
                }
                Err(e) if e.is_timeout() || e.is_connect() => Error::Http(e),
                Err(e) => return Err(Error::Http(e)),
            };

            if attempt >= self.config.max_retries {
                return Err(retryable);
            }
            let delay = backoff(attempt);
            tracing::debug!(attempt = attempt + 1, ?delay, error = %retryable, "retrying registry query");
            sleep(delay).await;
            attempt += 1;
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn backoff(attempt: u32) -> Duration {
    let millis = BASE_DELAY_MS.saturating_mul(1 << attempt.min(16));
    Duration::from_millis(millis.min(MAX_DELAY_MS))
}

fn graphql_data(payload: Value) -> Result<Value> {
    if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .map_or_else(|| e.to_string(), ToString::to_string)
                })
                .collect();
            return Err(Error::Registry(messages.join("; ")));
        }
    }
    payload
        .get("data")
        .cloned()
        .ok_or_else(|| Error::Registry("GraphQL response has no data".to_string()))
}

/// One page of the `runs` connection: descriptors plus the next cursor.
fn parse_runs_page(
    data: &Value,
    entity: &str,
    project: &str,
) -> Result<(Vec<RunDescriptor>, Option<String>)> {
    let runs = data
        .get("project")
        .filter(|p| !p.is_null())
        .ok_or_else(|| Error::Registry(format!("project {entity}/{project} not found")))?
        .get("runs")
        .ok_or_else(|| Error::Registry("response is missing runs".to_string()))?;

    let descriptors: Vec<RunDescriptor> = runs
        .get("edges")
        .and_then(Value::as_array)
        .map(|edges| {
            edges
                .iter()
                .filter_map(|edge| edge.get("node"))
                .filter_map(|node| parse_run_node(node, entity, project))
                .collect()
        })
        .unwrap_or_default();

    let page_info = runs.get("pageInfo");
    let has_next = page_info
        .and_then(|p| p.get("hasNextPage"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let cursor = page_info
        .and_then(|p| p.get("endCursor"))
        .and_then(Value::as_str)
        .filter(|_| has_next)
        .map(ToString::to_string);

    Ok((descriptors, cursor))
}

fn parse_run_node(node: &Value, entity: &str, project: &str) -> Option<RunDescriptor> {
    let id = node.get("name")?.as_str()?.to_string();
    let name = node
        .get("displayName")
        .and_then(Value::as_str)
        .map_or_else(|| id.clone(), ToString::to_string);

    Some(RunDescriptor {
        entity: entity.to_string(),
        project: project.to_string(),
        name,
        group: node.get("group").and_then(Value::as_str).map(ToString::to_string),
        config: node.get("config").map(parse_config).unwrap_or_default(),
        created_at: node
            .get("createdAt")
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
        id,
    })
}

/// Decode W&B's config payload (a JSON string of `{key: {value, desc}}`),
/// dropping internal `_`-prefixed keys.
fn parse_config(raw: &Value) -> Map<String, Value> {
    let decoded = match raw {
        Value::String(s) => serde_json::from_str::<Value>(s).unwrap_or(Value::Null),
        other => other.clone(),
    };
    let Value::Object(entries) = decoded else {
        return Map::new();
    };

    entries
        .into_iter()
        .filter(|(key, _)| !key.starts_with('_'))
        .map(|(key, entry)| match entry {
            Value::Object(mut wrapped) if wrapped.contains_key("value") => {
                (key, wrapped.remove("value").unwrap_or(Value::Null))
            }
            other => (key, other),
        })
        .collect()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|t| t.and_utc())
        })
}

/// Replace bare `NaN`, `Infinity` and `-Infinity` tokens (outside string
/// literals) with `null` so the row parses as strict JSON.
fn sanitize_non_finite(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = raw;

    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else {
            let token = ["-Infinity", "Infinity", "NaN"]
                .into_iter()
                .find(|t| rest.starts_with(t));
            if let Some(token) = token {
                out.push_str("null");
                rest = &rest[token.len()..];
                continue;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn parse_history_row(row: &Value) -> Result<Record> {
    let value = match row {
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .or_else(|_| serde_json::from_str::<Value>(&sanitize_non_finite(raw)))?,
        other => other.clone(),
    };
    match value {
        Value::Object(record) => Ok(record),
        other => Err(Error::Registry(format!("history row is not an object: {other}"))),
    }
}

fn run_field<'a>(data: &'a Value, run: &RunDescriptor, field: &str) -> Result<&'a Value> {
    data.get("project")
        .and_then(|p| p.get("run"))
        .filter(|r| !r.is_null())
        .ok_or_else(|| {
            Error::Registry(format!(
                "run {}/{}/{} not found",
                run.entity, run.project, run.id
            ))
        })?
        .get(field)
        .ok_or_else(|| Error::Registry(format!("response is missing {field}")))
}

impl RunRegistry for WandbRegistry {
    async fn runs(
        &self,
        entity: &str,
        project: &str,
        filters: Option<&Value>,
    ) -> Result<Vec<RunDescriptor>> {
        let filters = filters.map(Value::to_string);
        let mut cursor: Option<String> = None;
        let mut runs = Vec::new();

        loop {
            let variables = json!({
                "entity": entity,
                "project": project,
                "cursor": cursor,
                "perPage": PAGE_SIZE,
                "filters": filters,
            });
            let data = self.query(RUNS_QUERY, variables).await?;
            let (page, next) = parse_runs_page(&data, entity, project)?;
            tracing::debug!(entity, project, page_runs = page.len(), "listed run page");
            runs.extend(page);

            match next {
                Some(next) => cursor = Some(next),
                None => return Ok(runs),
            }
        }
    }

    async fn history(&self, run: &RunDescriptor, request: &HistoryRequest) -> Result<Vec<Record>> {
        let base = json!({
            "entity": run.entity,
            "project": run.project,
            "name": run.id,
        });

        match &request.keys {
            None => {
                let mut variables = base;
                variables["samples"] = json!(request.samples);
                let data = self.query(HISTORY_QUERY, variables).await?;
                run_field(&data, run, "history")?
                    .as_array()
                    .map(|rows| rows.iter().map(parse_history_row).collect())
                    .unwrap_or_else(|| Ok(Vec::new()))
            }
            Some(keys) => {
                let mut spec_keys = vec![STEP.to_string()];
                spec_keys.extend(keys.iter().filter(|k| k.as_str() != STEP).cloned());
                let spec = json!({ "keys": spec_keys, "samples": request.samples });

                let mut variables = base;
                variables["specs"] = json!([spec.to_string()]);
                let data = self.query(SAMPLED_HISTORY_QUERY, variables).await?;
                run_field(&data, run, "sampledHistory")?
                    .get(0)
                    .and_then(Value::as_array)
                    .map(|rows| rows.iter().map(parse_history_row).collect())
                    .unwrap_or_else(|| Ok(Vec::new()))
            }
        }
    }
}
