use crate::cache::{CacheConfig, CacheStrategy};
use crate::error::QueryServerError;
use crate::format::ResultFormat;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RESULTS: usize = 1000;
const DEFAULT_CACHE_TTL_SECS: i64 = 300;
const DEFAULT_CACHE_MAX_SIZE: usize = 100;
const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransportKind {
    #[value(alias = "stream-http", alias = "stream_http")]
    #[serde(alias = "stream-http", alias = "stream_http")]
    Http,
    Stdio,
}

/// Fully resolved server configuration.
///
/// Built from CLI flags layered over an optional YAML/JSON config file;
/// every knob also has an environment variable (the `SPARQL_*` names the
/// original deployment used).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// SPARQL endpoint URL the server queries.
    pub endpoint_url: String,
    /// Remote request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Result rows are truncated to this bound before formatting.
    pub max_results: usize,
    /// Query result cache settings.
    pub cache: CacheConfig,
    /// Format used when a caller omits the `format` argument.
    pub default_format: ResultFormat,
    /// Pretty-print the JSON text content of query responses.
    pub pretty_print: bool,
    /// Attach a `metadata` object (timing, cache outcome) to query results.
    pub include_metadata: bool,
    /// When set, only these tools may be invoked.
    pub enabled_tools: Option<HashSet<String>>,
    pub transport: TransportKind,
    pub http_bind_address: SocketAddr,
}

impl ServerConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            endpoint: cli_endpoint,
            timeout: cli_timeout,
            max_results: cli_max_results,
            cache_enabled: cli_cache_enabled,
            cache_ttl: cli_cache_ttl,
            cache_max_size: cli_cache_max_size,
            cache_strategy: cli_cache_strategy,
            format: cli_format,
            pretty_print: cli_pretty_print,
            include_metadata: cli_include_metadata,
            enabled_tools: cli_enabled_tools,
            transport: cli_transport,
            http_bind: cli_http_bind,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            endpoint: file_endpoint,
            timeout: file_timeout,
            max_results: file_max_results,
            cache_enabled: file_cache_enabled,
            cache_ttl: file_cache_ttl,
            cache_max_size: file_cache_max_size,
            cache_strategy: file_cache_strategy,
            format: file_format,
            pretty_print: file_pretty_print,
            include_metadata: file_include_metadata,
            enabled_tools: file_enabled_tools,
            transport: file_transport,
            http_bind: file_http_bind,
        } = file_config;

        let endpoint_url = cli_endpoint
            .or(file_endpoint)
            .context("a SPARQL endpoint URL is required (--endpoint or SPARQL_ENDPOINT)")?;

        let enabled_tools = cli_enabled_tools
            .or(file_enabled_tools)
            .map(|tools| {
                tools
                    .into_iter()
                    .map(|tool| tool.to_ascii_lowercase())
                    .filter(|tool| !tool.is_empty())
                    .collect::<HashSet<_>>()
            })
            .filter(|set| !set.is_empty());

        let cache = CacheConfig {
            enabled: cli_cache_enabled.or(file_cache_enabled).unwrap_or(true),
            max_size: cli_cache_max_size
                .or(file_cache_max_size)
                .unwrap_or(DEFAULT_CACHE_MAX_SIZE),
            ttl_secs: cli_cache_ttl
                .or(file_cache_ttl)
                .unwrap_or(DEFAULT_CACHE_TTL_SECS),
            strategy: cli_cache_strategy
                .or(file_cache_strategy)
                .unwrap_or(CacheStrategy::Lru),
        };

        let http_bind_address = cli_http_bind.or(file_http_bind).unwrap_or_else(|| {
            DEFAULT_HTTP_BIND
                .parse()
                .expect("default bind address valid")
        });

        Ok(Self {
            endpoint_url,
            request_timeout_secs: cli_timeout
                .or(file_timeout)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_results: cli_max_results
                .or(file_max_results)
                .unwrap_or(DEFAULT_MAX_RESULTS),
            cache,
            default_format: cli_format.or(file_format).unwrap_or(ResultFormat::Raw),
            pretty_print: cli_pretty_print || file_pretty_print.unwrap_or(false),
            include_metadata: cli_include_metadata
                .or(file_include_metadata)
                .unwrap_or(true),
            enabled_tools,
            transport: cli_transport.or(file_transport).unwrap_or(TransportKind::Stdio),
            http_bind_address,
        })
    }

    /// Fail-fast validation, run once before the server starts.
    pub fn validate(&self) -> Result<(), QueryServerError> {
        reqwest::Url::parse(&self.endpoint_url).map_err(|e| {
            QueryServerError::InvalidConfiguration(format!(
                "endpoint URL '{}' is not valid: {e}",
                self.endpoint_url
            ))
        })?;
        if self.request_timeout_secs == 0 {
            return Err(QueryServerError::InvalidConfiguration(
                "request timeout must be > 0 seconds".to_string(),
            ));
        }
        if self.max_results == 0 {
            return Err(QueryServerError::InvalidConfiguration(
                "max_results must be > 0".to_string(),
            ));
        }
        self.cache.validate()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn is_tool_enabled(&self, tool: &str) -> bool {
        match &self.enabled_tools {
            Some(set) => set.contains(&tool.to_ascii_lowercase()),
            None => true,
        }
    }
}

#[derive(Parser, Debug, Default, Clone)]
#[command(name = "sparql-mcp", about = "MCP SPARQL query server", version)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<std::path::PathBuf>,

    #[arg(
        long,
        env = "SPARQL_ENDPOINT",
        value_name = "URL",
        help = "SPARQL endpoint URL (e.g. https://data.legilux.public.lu/sparqlendpoint)"
    )]
    pub endpoint: Option<String>,

    #[arg(
        long,
        env = "SPARQL_TIMEOUT",
        value_name = "SECS",
        help = "Request timeout in seconds"
    )]
    pub timeout: Option<u64>,

    #[arg(
        long,
        env = "SPARQL_MAX_RESULTS",
        value_name = "N",
        help = "Maximum number of result rows to return"
    )]
    pub max_results: Option<usize>,

    #[arg(
        long,
        env = "SPARQL_CACHE_ENABLED",
        value_name = "BOOL",
        help = "Enable query result caching"
    )]
    pub cache_enabled: Option<bool>,

    #[arg(
        long,
        env = "SPARQL_CACHE_TTL",
        value_name = "SECS",
        help = "Cache time-to-live in seconds (0 disables expiry)"
    )]
    pub cache_ttl: Option<i64>,

    #[arg(
        long,
        env = "SPARQL_CACHE_MAX_SIZE",
        value_name = "N",
        help = "Maximum number of cached query results"
    )]
    pub cache_max_size: Option<usize>,

    #[arg(
        long,
        env = "SPARQL_CACHE_STRATEGY",
        value_enum,
        value_name = "STRATEGY",
        help = "Cache replacement strategy (lru, lfu, or fifo)"
    )]
    pub cache_strategy: Option<CacheStrategy>,

    #[arg(
        long,
        env = "SPARQL_FORMAT",
        value_enum,
        value_name = "FORMAT",
        help = "Default result format (raw/json, simplified, or tabular)"
    )]
    pub format: Option<ResultFormat>,

    #[arg(
        long,
        env = "SPARQL_PRETTY_PRINT",
        help = "Pretty print JSON text output"
    )]
    pub pretty_print: bool,

    #[arg(
        long,
        env = "SPARQL_INCLUDE_METADATA",
        value_name = "BOOL",
        help = "Include query metadata (timing, cache outcome) in results"
    )]
    pub include_metadata: Option<bool>,

    #[arg(
        long,
        env = "SPARQL_MCP_ENABLED_TOOLS",
        value_name = "TOOL",
        value_delimiter = ',',
        help = "Restrict execution to the provided tool names"
    )]
    pub enabled_tools: Option<Vec<String>>,

    #[arg(
        long,
        env = "MCP_TRANSPORT",
        value_enum,
        value_name = "TRANSPORT",
        help = "Transport to expose (stdio or http)"
    )]
    pub transport: Option<TransportKind>,

    #[arg(
        long,
        env = "MCP_HTTP_BIND",
        value_name = "ADDR",
        help = "HTTP bind address when using http transport"
    )]
    pub http_bind: Option<SocketAddr>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    endpoint: Option<String>,
    timeout: Option<u64>,
    max_results: Option<usize>,
    cache_enabled: Option<bool>,
    cache_ttl: Option<i64>,
    cache_max_size: Option<usize>,
    cache_strategy: Option<CacheStrategy>,
    format: Option<ResultFormat>,
    pretty_print: Option<bool>,
    include_metadata: Option<bool>,
    enabled_tools: Option<Vec<String>>,
    transport: Option<TransportKind>,
    http_bind: Option<SocketAddr>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_with_endpoint() -> CliArgs {
        CliArgs {
            endpoint: Some("https://example.org/sparql".to_string()),
            ..CliArgs::default()
        }
    }

    #[test]
    fn defaults_match_the_documented_contract() {
        let config = ServerConfig::from_args(args_with_endpoint()).unwrap();
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.max_results, 1000);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.cache.max_size, 100);
        assert_eq!(config.cache.strategy, CacheStrategy::Lru);
        assert_eq!(config.default_format, ResultFormat::Raw);
        assert!(!config.pretty_print);
        assert!(config.include_metadata);
        assert_eq!(config.transport, TransportKind::Stdio);
        config.validate().unwrap();
    }

    #[test]
    fn endpoint_is_required() {
        assert!(ServerConfig::from_args(CliArgs::default()).is_err());
    }

    #[test]
    fn invalid_endpoint_url_fails_validation() {
        let mut args = args_with_endpoint();
        args.endpoint = Some("not a url".to_string());
        let config = ServerConfig::from_args(args).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_ttl_fails_validation() {
        let mut args = args_with_endpoint();
        args.cache_ttl = Some(-5);
        let config = ServerConfig::from_args(args).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_cache_size_rejected_only_when_enabled() {
        let mut args = args_with_endpoint();
        args.cache_max_size = Some(0);
        let config = ServerConfig::from_args(args.clone()).unwrap();
        assert!(config.validate().is_err());

        args.cache_enabled = Some(false);
        let config = ServerConfig::from_args(args).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn cli_overrides_config_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "endpoint: https://file.example.org/sparql\ncache_strategy: fifo\ncache_ttl: 60"
        )
        .unwrap();

        let args = CliArgs {
            config: Some(file.path().to_path_buf()),
            cache_strategy: Some(CacheStrategy::Lfu),
            ..CliArgs::default()
        };
        let config = ServerConfig::from_args(args).unwrap();
        assert_eq!(config.endpoint_url, "https://file.example.org/sparql");
        assert_eq!(config.cache.strategy, CacheStrategy::Lfu);
        assert_eq!(config.cache.ttl_secs, 60);
    }

    #[test]
    fn enabled_tools_filter_is_case_insensitive() {
        let mut args = args_with_endpoint();
        args.enabled_tools = Some(vec!["Query".to_string(), "cache".to_string()]);
        let config = ServerConfig::from_args(args).unwrap();
        assert!(config.is_tool_enabled("query"));
        assert!(config.is_tool_enabled("CACHE"));
        assert!(!config.is_tool_enabled("search_documents"));
    }
}
