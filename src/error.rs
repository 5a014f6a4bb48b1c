//! Error types for the query server core and their mapping onto MCP
//! error responses.

use crate::client::EndpointError;
use crate::format::ResultFormat;
use thiserror::Error;

/// Errors surfaced by the query orchestrator and tool layer.
///
/// Cache operations never appear here: the cache degrades (treats trouble as
/// a miss) rather than erroring. Remote failures are reported with their
/// underlying cause and are never cached.
#[derive(Debug, Error)]
pub enum QueryServerError {
    /// Unrecognized format token. Reported before any cache or remote
    /// interaction takes place.
    #[error("invalid format: {0}. Must be one of: {}", ResultFormat::ACCEPTED_TOKENS.join(", "))]
    InvalidFormat(String),

    /// The remote endpoint was unreachable, timed out, or returned data we
    /// could not parse.
    #[error("SPARQL query failed: {0}")]
    RemoteQueryFailed(#[from] EndpointError),

    /// Rejected at construction time; fatal to startup.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Convert a core error into the MCP error payload for the transport.
///
/// Caller mistakes (a bad format token) become invalid-params errors;
/// everything else is an internal error carrying the cause string.
pub fn to_mcp_error(error: QueryServerError) -> rmcp::ErrorData {
    match &error {
        QueryServerError::InvalidFormat(_) => {
            rmcp::ErrorData::invalid_params(error.to_string(), None)
        }
        QueryServerError::RemoteQueryFailed(_) | QueryServerError::InvalidConfiguration(_) => {
            rmcp::ErrorData::internal_error(error.to_string(), None)
        }
    }
}
