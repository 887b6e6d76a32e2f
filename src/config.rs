use crate::search::{default_deal_type_codes, default_location_codes, SearchType};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "search-bench")]
#[command(about = "Fixed-rate load generator for the advanced search RPC service", long_about = None)]
pub struct Config {
    /// Requests dispatched per second
    #[arg(short = 'q', long, env = "QPS", default_value = "50")]
    pub qps: usize,

    /// Page size requested by every search
    #[arg(short = 'p', long, env = "PAGE_SIZE", default_value = "50")]
    pub page_size: i32,

    /// Search type (0-6)
    #[arg(short = 't', long, env = "SEARCH_TYPE", default_value = "1")]
    pub search_type: u8,

    /// Latency above which a request counts as timed out, in milliseconds
    #[arg(short = 'l', long = "time-limit", env = "TIME_LIMIT_MS", default_value = "500")]
    pub time_limit_ms: u64,

    /// Number of conditions per search request
    #[arg(short = 'c', long, env = "CONDITION_COUNT", default_value = "5")]
    pub condition_count: usize,

    /// Benchmark duration in seconds
    #[arg(short = 'm', long, env = "SECONDS", default_value = "60")]
    pub seconds: u64,

    /// Offset encoded into the pagination cursor
    #[arg(long, env = "CURSOR_OFFSET", default_value = "0")]
    pub offset: u32,

    /// Base URL of the search service
    #[arg(long, env = "SEARCH_ENDPOINT", default_value = "http://localhost:8081")]
    pub endpoint: Url,

    /// RPC route relative to the endpoint
    #[arg(
        long,
        env = "SEARCH_SERVICE_PATH",
        default_value = "twirp/advanced_search.AdvancedSearch/Search"
    )]
    pub service_path: String,

    /// Investors table
    #[arg(long, env = "INVESTORS_FILE", default_value = "../mock_data/investors.csv")]
    pub investors: PathBuf,

    /// Verticals table
    #[arg(long, env = "VERTICALS_FILE", default_value = "../mock_data/verticals.csv")]
    pub verticals: PathBuf,

    /// Industries table
    #[arg(long, env = "INDUSTRIES_FILE", default_value = "../mock_data/industries.csv")]
    pub industries: PathBuf,

    /// Headquarter location codes to draw from (comma separated)
    #[arg(long, env = "LOCATION_CODES", value_delimiter = ',')]
    pub location_codes: Vec<String>,

    /// Deal type codes to draw from (comma separated)
    #[arg(long, env = "DEAL_TYPE_CODES", value_delimiter = ',')]
    pub deal_type_codes: Vec<String>,

    /// Log the payload of every timed-out request as JSON
    #[arg(long, env = "LOG_TIMED_OUT", default_value_t = false)]
    pub log_timed_out: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("qps must be greater than zero")]
    ZeroQps,
    #[error("benchmark duration must be at least one second")]
    ZeroDuration,
    #[error("page size must be positive, got {0}")]
    InvalidPageSize(i32),
    #[error("unknown search type index {0}")]
    UnknownSearchType(u8),
    #[error("request count overflows: {qps} qps for {seconds}s")]
    RequestCountOverflow { qps: usize, seconds: u64 },
}

/// Validated run parameters shared by the driver, the tasks and the aggregator.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub qps: usize,
    pub duration: Duration,
    pub time_limit_ms: u64,
    pub page_size: i32,
    pub search_type: SearchType,
    pub condition_count: usize,
    pub cursor_offset: u32,
    pub log_timed_out: bool,
    pub location_codes: Vec<String>,
    pub deal_type_codes: Vec<String>,
    req_count: usize,
}

impl BenchConfig {
    pub fn new(qps: usize, seconds: u64) -> Result<Self, ConfigError> {
        if qps == 0 {
            return Err(ConfigError::ZeroQps);
        }
        if seconds == 0 {
            return Err(ConfigError::ZeroDuration);
        }
        let req_count = usize::try_from(seconds)
            .ok()
            .and_then(|secs| secs.checked_mul(qps))
            .ok_or(ConfigError::RequestCountOverflow { qps, seconds })?;

        Ok(Self {
            qps,
            duration: Duration::from_secs(seconds),
            time_limit_ms: 500,
            page_size: 50,
            search_type: SearchType::Company,
            condition_count: 5,
            cursor_offset: 0,
            log_timed_out: false,
            location_codes: default_location_codes(),
            deal_type_codes: default_deal_type_codes(),
            req_count,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        if config.page_size <= 0 {
            return Err(ConfigError::InvalidPageSize(config.page_size));
        }
        let search_type = SearchType::from_index(config.search_type)
            .ok_or(ConfigError::UnknownSearchType(config.search_type))?;

        let mut bench = Self::new(config.qps, config.seconds)?;
        bench.time_limit_ms = config.time_limit_ms;
        bench.page_size = config.page_size;
        bench.search_type = search_type;
        bench.condition_count = config.condition_count;
        bench.cursor_offset = config.offset;
        bench.log_timed_out = config.log_timed_out;
        if !config.location_codes.is_empty() {
            bench.location_codes = config.location_codes.clone();
        }
        if !config.deal_type_codes.is_empty() {
            bench.deal_type_codes = config.deal_type_codes.clone();
        }
        Ok(bench)
    }

    /// Total number of requests a full run dispatches: `qps * seconds`.
    pub fn req_count(&self) -> usize {
        self.req_count
    }

    pub fn seconds(&self) -> u64 {
        self.duration.as_secs()
    }

    /// Whether a latency crosses the time limit. Strictly greater, so a zero
    /// limit marks every non-zero latency.
    pub fn is_timeout(&self, cost: Duration) -> bool {
        cost.as_secs_f64() * 1000.0 > self.time_limit_ms as f64
    }
}
