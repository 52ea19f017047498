use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::decision::AutonomyLevel;
use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub langbase: LangbaseConfig,
    pub oracles: OracleConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub rate_limit: RateLimitConfig,
    pub planner: PlannerConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Oracle fan-out configuration
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Pipe names, one oracle per pipe, in consensus order.
    pub pipes: Vec<String>,
    /// Independent timeout applied to each oracle call.
    pub timeout_ms: u64,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Provider rate-limit guard configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum burst of oracle calls.
    pub capacity: u32,
    /// Tokens restored per second.
    pub refill_per_sec: f64,
}

/// Investigation planner configuration
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Which decision types may be made without operator approval.
    pub autonomy_level: AutonomyLevel,
    /// Results below this confidence trigger adaptation.
    pub adaptation_threshold: f64,
    /// Bounded retries for transient action failures.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Upper bound on strategy re-queries per investigation.
    pub max_adaptations: u32,
    /// Wall-clock budget per investigation.
    pub time_budget_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = LangbaseConfig {
            api_key: env::var("LANGBASE_API_KEY").map_err(|_| AppError::Config {
                message: "LANGBASE_API_KEY is required".to_string(),
            })?,
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
        };

        let oracles = OracleConfig {
            pipes: parse_pipe_list(
                &env::var("ORACLE_PIPES").unwrap_or_else(|_| {
                    "oracle-analyst-v1,oracle-skeptic-v1,oracle-forensic-v1".to_string()
                }),
            ),
            timeout_ms: env_or("ORACLE_TIMEOUT_MS", 30000),
        };

        if oracles.pipes.is_empty() {
            return Err(AppError::Config {
                message: "ORACLE_PIPES must name at least one pipe".to_string(),
            });
        }

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH")
                    .unwrap_or_else(|_| "./data/investigations.db".to_string()),
            ),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_or("REQUEST_TIMEOUT_MS", 30000),
            max_retries: env_or("MAX_RETRIES", 3),
            retry_delay_ms: env_or("RETRY_DELAY_MS", 1000),
        };

        let rate_limit = RateLimitConfig {
            capacity: env_or("RATE_LIMIT_CAPACITY", 10),
            refill_per_sec: env_or("RATE_LIMIT_REFILL_PER_SEC", 5.0),
        };

        let autonomy_level = match env::var("AUTONOMY_LEVEL") {
            Ok(raw) => AutonomyLevel::from_str(&raw).map_err(|message| AppError::Config {
                message,
            })?,
            Err(_) => AutonomyLevel::SemiAutonomous,
        };

        let planner = PlannerConfig {
            autonomy_level,
            adaptation_threshold: env_or("ADAPTATION_THRESHOLD", 0.5),
            max_retries: env_or("ACTION_MAX_RETRIES", 2),
            retry_delay_ms: env_or("ACTION_RETRY_DELAY_MS", 250),
            max_adaptations: env_or("MAX_ADAPTATIONS", 3),
            time_budget_secs: env_or("TIME_BUDGET_SECS", 600),
        };

        Ok(Config {
            langbase,
            oracles,
            database,
            logging,
            request,
            rate_limit,
            planner,
        })
    }
}

/// Read and parse an env var, falling back to `default` when unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Split a comma-separated pipe list, dropping blanks.
pub fn parse_pipe_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_per_sec: 5.0,
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            autonomy_level: AutonomyLevel::SemiAutonomous,
            adaptation_threshold: 0.5,
            max_retries: 2,
            retry_delay_ms: 250,
            max_adaptations: 3,
            time_budget_secs: 600,
        }
    }
}
