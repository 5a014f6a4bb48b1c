use crate::client::HttpSparqlClient;
use crate::config::ServerConfig;
use crate::error::{QueryServerError, to_mcp_error};
use crate::format::ResultFormat;
use crate::model::{CacheActionResponse, SearchResponse};
use crate::service::SparqlService;
use anyhow::Result;
use rmcp::{
    ErrorData as McpError, Json, ServerHandler, ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

const BASE_INSTRUCTIONS: &str = "\
SPARQL MCP: run SPARQL SELECT queries against a remote endpoint.

WORKFLOW:
1) query with a SPARQL SELECT string. Results are cached, so repeating a
   query (in the same format) is cheap within the cache TTL window.
2) Pick a format per call: 'raw' (alias 'json') for the standard SPARQL JSON
   results document, 'simplified' for one flat object per row, 'tabular' for
   a columns + rows matrix. Omit format to use the server default.
3) cache with action='stats' to inspect hit/miss/eviction counters, or
   action='clear' to reset the cache.
4) search_documents for keyword search over legal document titles (newest
   first) without writing SPARQL by hand.

Keep LIMIT clauses tight; the server truncates oversized result sets.";

fn build_instructions(config: &ServerConfig) -> String {
    format!(
        "{BASE_INSTRUCTIONS}\n\nEndpoint: {}\nDefault format: {}",
        config.endpoint_url, config.default_format
    )
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryParams {
    /// A valid SPARQL query string.
    pub query_string: String,
    /// Optional result format: raw (alias json), simplified, or tabular.
    pub format: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CacheParams {
    /// The action to perform on the cache: "clear" or "stats".
    pub action: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Search keywords, e.g. 'environmental protection' or 'tax law'.
    pub keywords: String,
    /// Maximum number of documents to return (default 10).
    pub limit: Option<usize>,
}

#[derive(Clone)]
pub struct SparqlQueryServer {
    service: Arc<SparqlService>,
    tool_router: ToolRouter<SparqlQueryServer>,
}

impl SparqlQueryServer {
    pub fn new(config: Arc<ServerConfig>) -> Result<Self> {
        let client = HttpSparqlClient::new(&config.endpoint_url, config.request_timeout())
            .map_err(QueryServerError::from)?;
        let service = Arc::new(SparqlService::new(config, Arc::new(client))?);
        Ok(Self::from_service(service))
    }

    pub fn from_service(service: Arc<SparqlService>) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    pub async fn run_stdio(self) -> Result<()> {
        let service = self
            .serve(stdio())
            .await
            .inspect_err(|error| tracing::error!("serving error: {:?}", error))?;
        service.waiting().await?;
        Ok(())
    }

    fn ensure_tool_enabled(&self, tool: &str) -> Result<(), McpError> {
        tracing::info!(tool = tool, "tool invocation requested");
        if self.service.config().is_tool_enabled(tool) {
            Ok(())
        } else {
            Err(McpError::invalid_request(
                format!("tool '{tool}' is disabled by server configuration"),
                None,
            ))
        }
    }
}

#[tool_router]
impl SparqlQueryServer {
    #[tool(
        name = "query",
        description = "Execute a SPARQL query against the configured endpoint"
    )]
    pub async fn query(
        &self,
        Parameters(params): Parameters<QueryParams>,
    ) -> Result<CallToolResult, McpError> {
        self.ensure_tool_enabled("query")?;

        // Unknown formats are rejected before any cache or remote work.
        let format = match params.format {
            Some(token) => Some(
                ResultFormat::from_token(&token)
                    .ok_or_else(|| to_mcp_error(QueryServerError::InvalidFormat(token)))?,
            ),
            None => None,
        };

        let value = self
            .service
            .execute(&params.query_string, format)
            .await
            .map_err(to_mcp_error)?;

        let text = if self.service.config().pretty_print {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        }
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(CallToolResult {
            content: vec![Content::text(text)],
            structured_content: Some(value),
            is_error: Some(false),
            meta: None,
        })
    }

    #[tool(
        name = "cache",
        description = "Manage the query cache: action is 'clear' or 'stats'"
    )]
    pub async fn cache(
        &self,
        Parameters(params): Parameters<CacheParams>,
    ) -> Result<Json<CacheActionResponse>, McpError> {
        self.ensure_tool_enabled("cache")?;

        let response = match params.action.to_ascii_lowercase().as_str() {
            "clear" => {
                self.service.clear_cache();
                CacheActionResponse::success("Cache cleared")
            }
            "stats" => CacheActionResponse::with_stats(self.service.cache_stats()),
            other => CacheActionResponse {
                status: "error".to_string(),
                message: Some(format!(
                    "Invalid cache action: {other}. Must be 'clear' or 'stats'."
                )),
                stats: None,
            },
        };
        Ok(Json(response))
    }

    #[tool(
        name = "search_documents",
        description = "Search legal documents by title keywords, newest first"
    )]
    pub async fn search_documents(
        &self,
        Parameters(params): Parameters<SearchParams>,
    ) -> Result<Json<SearchResponse>, McpError> {
        self.ensure_tool_enabled("search_documents")?;
        self.service
            .search_documents(&params.keywords, params.limit)
            .await
            .map(Json)
            .map_err(to_mcp_error)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for SparqlQueryServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(build_instructions(self.service.config())),
            ..ServerInfo::default()
        }
    }
}
