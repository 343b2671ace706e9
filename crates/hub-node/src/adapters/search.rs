//! Elasticsearch-backed `SearchIndex`.
//!
//! A `SearchQuery` becomes one `bool` query: exact selectors go to `filter`,
//! free-text fields to `must`, inverted selectors and censored channels to
//! `must_not`.

use crate::adapters::http_client;
use async_trait::async_trait;
use hub_gateway::domain::config::SearchConfig;
use hub_types::{ClaimOutput, SearchError, SearchIndex, SearchQuery, SearchResults, Selector};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

/// Fields returned for each hit.
const SOURCE_FIELDS: [&str; 6] = ["tx_hash", "nout", "height", "claim_id", "name", "channel_id"];

pub struct ElasticsearchIndex {
    client: reqwest::Client,
    search_url: String,
}

impl ElasticsearchIndex {
    pub fn new(config: &SearchConfig, timeout: Duration) -> Result<Self, SearchError> {
        let client = http_client(timeout).map_err(|e| SearchError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            search_url: format!("{}/{}/_search", config.url(), config.es_index),
        })
    }

    pub fn search_url(&self) -> &str {
        &self.search_url
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResults, SearchError> {
        let body = build_query(query);
        debug!(url = %self.search_url, "elasticsearch query");

        let response = self
            .client
            .post(&self.search_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::InvalidQuery(text));
        }
        if !status.is_success() {
            return Err(SearchError::Unavailable(format!("elasticsearch returned {}", status)));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| SearchError::Unavailable(e.to_string()))?;
        parse_response(&value, query.offset)
    }
}

/// Translate a normalized query into an Elasticsearch request body.
pub fn build_query(query: &SearchQuery) -> Value {
    let mut must = Vec::new();
    let mut filter = Vec::new();
    let mut must_not = Vec::new();

    if let Some(text) = &query.text {
        must.push(json!({
            "simple_query_string": {
                "query": text,
                "fields": ["name^4", "title^3", "description", "author^2", "tags"],
            }
        }));
    }
    if let Some(name) = &query.name {
        filter.push(json!({ "term": { "name": name } }));
    }
    for (field, value) in [
        ("author", &query.author),
        ("title", &query.title),
        ("description", &query.description),
    ] {
        if let Some(value) = value {
            must.push(json!({ "match": { field: value } }));
        }
    }

    selector_clause("claim_id", &query.claim_id, &mut filter, &mut must_not);
    selector_clause("channel_id", &query.channel, &mut filter, &mut must_not);

    if !query.claim_types.is_empty() {
        filter.push(json!({ "terms": { "claim_type": query.claim_types } }));
    }
    if !query.any_tags.is_empty() {
        filter.push(json!({ "terms": { "tags": query.any_tags } }));
    }
    for tag in &query.all_tags {
        filter.push(json!({ "term": { "tags": tag } }));
    }
    if !query.not_tags.is_empty() {
        must_not.push(json!({ "terms": { "tags": query.not_tags } }));
    }

    if let Some(censorship) = &query.censorship {
        let channels: Vec<&String> = censorship
            .blocked_channels
            .iter()
            .chain(&censorship.filtered_channels)
            .collect();
        if !channels.is_empty() {
            must_not.push(json!({ "terms": { "channel_id": channels } }));
        }
    }

    let mut bool_query = Map::new();
    for (key, clauses) in [("must", must), ("filter", filter), ("must_not", must_not)] {
        if !clauses.is_empty() {
            bool_query.insert(key.to_string(), Value::Array(clauses));
        }
    }

    let mut body = json!({
        "query": { "bool": bool_query },
        "from": query.offset,
        "size": query.limit,
        "_source": SOURCE_FIELDS,
        "track_total_hits": true,
    });
    let sort = sort_clause(&query.order_by);
    if !sort.is_empty() {
        body["sort"] = Value::Array(sort);
    }
    body
}

fn selector_clause(
    field: &str,
    selector: &Selector,
    filter: &mut Vec<Value>,
    must_not: &mut Vec<Value>,
) {
    match selector {
        Selector::Any => {}
        Selector::Single(id) => filter.push(json!({ "term": { field: id } })),
        Selector::Many { ids, invert: false } => filter.push(json!({ "terms": { field: ids } })),
        Selector::Many { ids, invert: true } => must_not.push(json!({ "terms": { field: ids } })),
    }
}

/// `^field` sorts ascending, a bare field descending.
fn sort_clause(order_by: &[String]) -> Vec<Value> {
    order_by
        .iter()
        .map(|field| match field.strip_prefix('^') {
            Some(field) => json!({ field: { "order": "asc" } }),
            None => json!({ field.as_str(): { "order": "desc" } }),
        })
        .collect()
}

/// Extract hits and the total from an Elasticsearch response.
pub fn parse_response(value: &Value, offset: u32) -> Result<SearchResults, SearchError> {
    let hits = value
        .get("hits")
        .ok_or_else(|| SearchError::Unavailable("response has no hits".into()))?;

    let total = match &hits["total"] {
        Value::Number(n) => n.as_u64(),
        other => other["value"].as_u64(),
    }
    .unwrap_or(0);

    let txos = hits["hits"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|hit| serde_json::from_value::<ClaimOutput>(hit["_source"].clone()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SearchError::Unavailable(format!("malformed hit: {}", e)))?;

    Ok(SearchResults {
        txos,
        extra_txos: Vec::new(),
        total: u32::try_from(total).unwrap_or(u32::MAX),
        offset,
        blocked_total: 0,
    })
}
