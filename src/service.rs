//! Query orchestration: cache consultation, remote execution, formatting.
//!
//! `SparqlService` enforces at most one remote call per distinct
//! (query, format) pair within the cache TTL window. The remote call happens
//! outside the cache lock, so concurrent requests for other keys are never
//! blocked on network latency. Two concurrent misses for the identical key
//! may both reach the endpoint and both write the cache (last writer wins);
//! that duplication is accepted rather than corrected with a single-flight
//! mechanism.

use crate::cache::{CacheKey, QueryCache};
use crate::client::SparqlEndpoint;
use crate::config::ServerConfig;
use crate::error::QueryServerError;
use crate::format::ResultFormat;
use crate::model::{CacheStatsSnapshot, SearchDocument, SearchResponse};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const DEFAULT_SEARCH_LIMIT: usize = 10;

pub struct SparqlService {
    config: Arc<ServerConfig>,
    endpoint: Arc<dyn SparqlEndpoint>,
    cache: QueryCache,
}

impl SparqlService {
    /// Build the service; fails fast on an invalid cache configuration.
    pub fn new(
        config: Arc<ServerConfig>,
        endpoint: Arc<dyn SparqlEndpoint>,
    ) -> Result<Self, QueryServerError> {
        let cache = QueryCache::new(config.cache.clone())?;
        Ok(Self {
            config,
            endpoint,
            cache,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Execute a query, serving from the cache when possible.
    ///
    /// On a hit the endpoint is never invoked. On a miss the endpoint is
    /// called, the raw result is formatted, stored (when caching is
    /// enabled), and returned. Endpoint failures are reported to the caller
    /// and never cached.
    pub async fn execute(
        &self,
        query_text: &str,
        format: Option<ResultFormat>,
    ) -> Result<Value, QueryServerError> {
        let format = format.unwrap_or(self.config.default_format);
        let started = Instant::now();
        let key = CacheKey::for_query(query_text, format.token());

        if self.config.cache.enabled {
            if let Some(value) = self.cache.get(key) {
                debug!(cache_key = %key, format = %format, "query served from cache");
                return Ok(self.attach_metadata(value, format, true, started));
            }
        }

        let mut raw = self.endpoint.select(query_text).await?;
        if raw.rows.len() > self.config.max_results {
            debug!(
                returned = raw.rows.len(),
                max_results = self.config.max_results,
                "truncating result rows"
            );
            raw.rows.truncate(self.config.max_results);
        }

        let formatted = format.format(&raw);
        if self.config.cache.enabled {
            self.cache.put(key, formatted.clone());
        }

        debug!(
            cache_key = %key,
            format = %format,
            rows = raw.row_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query executed against endpoint"
        );
        Ok(self.attach_metadata(formatted, format, false, started))
    }

    /// Keyword search over document titles, newest first.
    ///
    /// Runs the jolux title-filter query through the normal `execute` path
    /// (so results are cached like any other query) and reshapes the
    /// simplified rows into document records.
    pub async fn search_documents(
        &self,
        keywords: &str,
        limit: Option<usize>,
    ) -> Result<SearchResponse, QueryServerError> {
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT).max(1);
        let query = build_search_query(keywords, limit);

        let value = self
            .execute(&query, Some(ResultFormat::Simplified))
            .await?;

        let results = value
            .get("results")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .map(|row| SearchDocument {
                        uri: string_field(row, "entity"),
                        title: string_field(row, "title"),
                        date: string_field(row, "date"),
                        doc_type: string_field(row, "docType"),
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(SearchResponse {
            count: results.len(),
            results,
            query_used: query,
        })
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }

    fn attach_metadata(
        &self,
        value: Value,
        format: ResultFormat,
        cached: bool,
        started: Instant,
    ) -> Value {
        if !self.config.include_metadata {
            return value;
        }
        let row_count = row_count_of(format, &value);
        let mut value = value;
        if let Value::Object(map) = &mut value {
            map.insert(
                "metadata".to_string(),
                json!({
                    "cached": cached,
                    "execution_time_ms": started.elapsed().as_millis() as u64,
                    "row_count": row_count,
                    "format": format.token(),
                }),
            );
        }
        value
    }
}

fn row_count_of(format: ResultFormat, value: &Value) -> u64 {
    let rows = match format {
        ResultFormat::Raw => value
            .get("results")
            .and_then(|results| results.get("bindings"))
            .and_then(Value::as_array)
            .map(|bindings| bindings.len()),
        ResultFormat::Simplified => value
            .get("results")
            .and_then(Value::as_array)
            .map(|results| results.len()),
        ResultFormat::Tabular => value
            .get("rows")
            .and_then(Value::as_array)
            .map(|rows| rows.len()),
    };
    rows.unwrap_or(0) as u64
}

/// Build the document-title search query. Keywords are regex-escaped so user
/// input cannot alter the query structure.
fn build_search_query(keywords: &str, limit: usize) -> String {
    let pattern = regex::escape(keywords).replace('\'', "\\'");
    format!(
        "PREFIX jolux: <http://data.legilux.public.lu/resource/ontology/jolux#>\n\
         PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>\n\
         \n\
         SELECT DISTINCT ?entity ?date ?title ?docType\n\
         WHERE {{\n\
         \x20   ?entity jolux:dateDocument ?date ;\n\
         \x20           a ?docType ;\n\
         \x20           jolux:isRealizedBy ?expression .\n\
         \x20   ?expression jolux:title ?title .\n\
         \x20   FILTER(regex(str(?title), '{pattern}'^^xsd:string))\n\
         }}\n\
         ORDER BY DESC(?date)\n\
         LIMIT {limit}"
    )
}

fn string_field(row: &Value, field: &str) -> String {
    row.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
