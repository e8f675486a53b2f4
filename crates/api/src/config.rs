//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use inventory::Product;
use saga::RetryPolicy;
use thiserror::Error;

/// Which services a process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Every router on one listener, orchestrator wired in-process.
    #[default]
    All,
    Orchestrator,
    Reservation,
    Finalization,
    Payment,
    Notification,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::All => "all",
            Role::Orchestrator => "orchestrator",
            Role::Reservation => "reservation",
            Role::Finalization => "finalization",
            Role::Payment => "payment",
            Role::Notification => "notification",
        }
    }

    /// Returns true if the role needs the inventory ledger.
    pub fn uses_ledger(&self) -> bool {
        matches!(self, Role::All | Role::Reservation | Role::Finalization)
    }

    /// Returns true if the role runs the orchestrator.
    pub fn runs_orchestrator(&self) -> bool {
        matches!(self, Role::All | Role::Orchestrator)
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Role::All),
            "orchestrator" => Ok(Role::Orchestrator),
            "reservation" => Ok(Role::Reservation),
            "finalization" => Ok(Role::Finalization),
            "payment" => Ok(Role::Payment),
            "notification" => Ok(Role::Notification),
            other => Err(ConfigError::UnknownRole(other.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown ROLE '{0}'")]
    UnknownRole(String),

    #[error("invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default: `0.0.0.0:8005`)
/// - `ROLE`: services to serve (default: `all`)
/// - `DATABASE_URL`: Postgres URL; in-memory backends when unset
/// - `PRODUCTS`: stock levels set at startup, as `id:quantity` pairs
///   separated by commas (`1:100,2:50`)
/// - `ALLOWED_ORIGIN`: CORS origin of the orchestrator
/// - `RESERVATION_URL`, `PAYMENT_URL`, `NOTIFICATION_URL`,
///   `FINALIZATION_URL`: downstream services of the orchestrator role
/// - `STEP_TIMEOUT_MS`, `STEP_MAX_ATTEMPTS`, `STEP_RETRY_BACKOFF_MS`
/// - `LOG_FORMAT`: `json` for JSON logs
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub role: Role,
    pub database_url: Option<String>,
    pub products: Vec<Product>,
    pub allowed_origin: String,
    pub reservation_url: String,
    pub payment_url: String,
    pub notification_url: String,
    pub finalization_url: String,
    pub step_timeout: Duration,
    pub step_max_attempts: u32,
    pub step_retry_backoff: Duration,
    pub log_format: LogFormat,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let var = |name: &str, default: String| lookup(name).unwrap_or(default);

        Ok(Self {
            host: var("HOST", defaults.host),
            port: parse(&lookup, "PORT", defaults.port)?,
            role: match lookup("ROLE") {
                Some(role) => role.parse()?,
                None => defaults.role,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            products: match lookup("PRODUCTS") {
                Some(value) => parse_products(&value)?,
                None => defaults.products,
            },
            allowed_origin: var("ALLOWED_ORIGIN", defaults.allowed_origin),
            reservation_url: var("RESERVATION_URL", defaults.reservation_url),
            payment_url: var("PAYMENT_URL", defaults.payment_url),
            notification_url: var("NOTIFICATION_URL", defaults.notification_url),
            finalization_url: var("FINALIZATION_URL", defaults.finalization_url),
            step_timeout: Duration::from_millis(parse(&lookup, "STEP_TIMEOUT_MS", 5000)?),
            step_max_attempts: parse(&lookup, "STEP_MAX_ATTEMPTS", defaults.step_max_attempts)?,
            step_retry_backoff: Duration::from_millis(parse(
                &lookup,
                "STEP_RETRY_BACKOFF_MS",
                100,
            )?),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            log_level: var("RUST_LOG", defaults.log_level),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.step_timeout,
            self.step_max_attempts,
            self.step_retry_backoff,
        )
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

/// Parses `id:quantity` pairs separated by commas.
fn parse_products(value: &str) -> Result<Vec<Product>, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        name: "PRODUCTS",
        value: value.to_string(),
    };

    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (id, quantity) = pair.split_once(':').ok_or_else(invalid)?;
            let id: i64 = id.trim().parse().map_err(|_| invalid())?;
            let quantity: i64 = quantity.trim().parse().map_err(|_| invalid())?;
            if quantity < 0 {
                return Err(invalid());
            }
            Ok(Product::new(id, quantity))
        })
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8005,
            role: Role::All,
            database_url: None,
            products: Vec::new(),
            allowed_origin: "http://localhost:9003".to_string(),
            reservation_url: "http://localhost:9003".to_string(),
            payment_url: "http://localhost:8006".to_string(),
            notification_url: "http://localhost:8004".to_string(),
            finalization_url: "http://localhost:8007".to_string(),
            step_timeout: Duration::from_millis(5000),
            step_max_attempts: 3,
            step_retry_backoff: Duration::from_millis(100),
            log_format: LogFormat::Text,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.addr(), "0.0.0.0:8005");
        assert_eq!(config.role, Role::All);
        assert!(config.database_url.is_none());
        assert_eq!(config.allowed_origin, "http://localhost:9003");
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "9003"),
            ("ROLE", "Reservation"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("STEP_TIMEOUT_MS", "250"),
            ("STEP_MAX_ATTEMPTS", "1"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9003);
        assert_eq!(config.role, Role::Reservation);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/shop"));
        assert_eq!(config.step_timeout, Duration::from_millis(250));
        assert_eq!(config.retry_policy().max_attempts, 1);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("ROLE", "billing")])),
            Err(ConfigError::UnknownRole(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("PORT", "http")])),
            Err(ConfigError::InvalidValue { name: "PORT", .. })
        ));
    }

    #[test]
    fn test_products_seed() {
        let config = Config::from_lookup(lookup(&[("PRODUCTS", "1:100, 2:0,")])).unwrap();
        assert_eq!(config.products, vec![Product::new(1, 100), Product::new(2, 0)]);

        for bad in ["1", "1:x", "a:1", "1:-5"] {
            assert!(matches!(
                Config::from_lookup(lookup(&[("PRODUCTS", bad)])),
                Err(ConfigError::InvalidValue { name: "PRODUCTS", .. })
            ));
        }
    }

    #[test]
    fn test_role_capabilities() {
        assert!(Role::All.uses_ledger() && Role::All.runs_orchestrator());
        assert!(!Role::Orchestrator.uses_ledger());
        assert!(Role::Finalization.uses_ledger());
        assert!(!Role::Payment.runs_orchestrator());
    }
}
