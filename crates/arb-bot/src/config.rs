//! Application configuration.
//!
//! One TOML file holds every section. The scanner, verify, position and
//! notify sections are hot: [`ConfigHandle`] re-reads them when the file's
//! modification time changes. The remaining sections are read once at
//! startup.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use arb_core::ConfigSource;
use arb_position::PositionConfig;
use arb_price::ResolverConfig;
use arb_telemetry::Metrics;
use arb_verify::{SafetyConfig, VerifyConfig};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

/// Default config path when neither the CLI nor `ARB_CONFIG` names one.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

// ============================================================================
// ScannerConfig
// ============================================================================

/// Worker pool and auxiliary loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Concurrent scan tasks per wave.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_wave_pause_secs")]
    pub wave_pause_secs: u64,
    #[serde(default = "default_cycle_pause_secs")]
    pub cycle_pause_secs: u64,
    /// Candidacy band for `|spread|`, in percent.
    #[serde(default = "default_min_spread_pct")]
    pub min_spread_pct: Decimal,
    #[serde(default = "default_max_spread_pct")]
    pub max_spread_pct: Decimal,
    /// Restrict scanning to these symbols. Empty scans the venue universe.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Extra base assets never traded, on top of the stablecoin list.
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default = "default_selector_interval_secs")]
    pub selector_interval_secs: u64,
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_balance_interval_secs")]
    pub balance_interval_secs: u64,
    #[serde(default = "default_config_poll_secs")]
    pub config_poll_secs: u64,
}

fn default_max_concurrent() -> usize {
    10
}

fn default_wave_pause_secs() -> u64 {
    5
}

fn default_cycle_pause_secs() -> u64 {
    30
}

fn default_min_spread_pct() -> Decimal {
    Decimal::new(5, 1)
}

fn default_max_spread_pct() -> Decimal {
    Decimal::from(10)
}

fn default_selector_interval_secs() -> u64 {
    30
}

fn default_reconcile_interval_secs() -> u64 {
    300
}

fn default_balance_interval_secs() -> u64 {
    60
}

fn default_config_poll_secs() -> u64 {
    5
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            wave_pause_secs: default_wave_pause_secs(),
            cycle_pause_secs: default_cycle_pause_secs(),
            min_spread_pct: default_min_spread_pct(),
            max_spread_pct: default_max_spread_pct(),
            symbols: Vec::new(),
            blacklist: Vec::new(),
            selector_interval_secs: default_selector_interval_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            balance_interval_secs: default_balance_interval_secs(),
            config_poll_secs: default_config_poll_secs(),
        }
    }
}

impl ScannerConfig {
    pub fn wave_pause(&self) -> Duration {
        Duration::from_secs(self.wave_pause_secs)
    }

    pub fn cycle_pause(&self) -> Duration {
        Duration::from_secs(self.cycle_pause_secs)
    }

    /// `min_spread <= |spread| <= max_spread`.
    pub fn is_candidate(&self, spread_pct: Decimal) -> bool {
        let abs = spread_pct.abs();
        abs >= self.min_spread_pct && abs <= self.max_spread_pct
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be at least 1".to_string());
        }
        if self.min_spread_pct > self.max_spread_pct {
            return Err(format!(
                "min_spread_pct ({}) must not exceed max_spread_pct ({})",
                self.min_spread_pct, self.max_spread_pct
            ));
        }
        Ok(())
    }
}

// ============================================================================
// NotifyConfig
// ============================================================================

/// Notification delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Generic JSON webhook (`{"text": ...}`).
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Telegram chat id. The bot token is read from `ARB_TELEGRAM_TOKEN`.
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    /// Minimum time between opportunity alerts for one symbol.
    #[serde(default = "default_notify_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_notify_cooldown_secs() -> u64 {
    300
}

fn default_notify_timeout_secs() -> u64 {
    10
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            telegram_chat_id: None,
            cooldown_secs: default_notify_cooldown_secs(),
            timeout_secs: default_notify_timeout_secs(),
        }
    }
}

impl NotifyConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }
}

// ============================================================================
// Static sections
// ============================================================================

/// Paper venue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Public futures market-data API.
    #[serde(default = "default_market_url")]
    pub market_url: String,
    /// Starting USD balance.
    #[serde(default = "default_paper_balance")]
    pub initial_balance: Decimal,
    #[serde(default = "default_paper_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_market_url() -> String {
    "https://fapi.xt.com".to_string()
}

fn default_paper_balance() -> Decimal {
    Decimal::from(100)
}

fn default_paper_timeout_secs() -> u64 {
    10
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            market_url: default_market_url(),
            initial_balance: default_paper_balance(),
            timeout_secs: default_paper_timeout_secs(),
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Position table snapshot.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    /// Directory for `trades_YYYY-MM-DD.jsonl`.
    #[serde(default = "default_trades_dir")]
    pub trades_dir: String,
}

fn default_snapshot_path() -> String {
    "./data/positions.json".to_string()
}

fn default_trades_dir() -> String {
    "./data/trades".to_string()
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            trades_dir: default_trades_dir(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Prometheus text file rewritten on every balance tick, for a
    /// textfile collector. `None` disables it.
    #[serde(default)]
    pub metrics_path: Option<String>,
    /// Bound on waiting for loops to finish after shutdown is requested.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_path: None,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

// ============================================================================
// AppConfig
// ============================================================================

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub position: PositionConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load `path`, or defaults with a warning if the file does not exist.
    pub fn load(path: &str) -> AppResult<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            warn!(path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load and validate a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.runtime().validate()?;
        self.resolver
            .validate()
            .map_err(|e| AppError::Config(format!("resolver: {e}")))?;
        if !self.paper.initial_balance.is_sign_positive() {
            return Err(AppError::Config(
                "paper.initial_balance must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Hot-reloadable part of the configuration.
    pub fn runtime(&self) -> RuntimeConfig {
        RuntimeConfig {
            scanner: self.scanner.clone(),
            verify: self.verify.clone(),
            position: self.position.clone(),
            notify: self.notify.clone(),
        }
    }
}

// ============================================================================
// RuntimeConfig
// ============================================================================

/// Settings swapped in place on reload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeConfig {
    pub scanner: ScannerConfig,
    pub verify: VerifyConfig,
    pub position: PositionConfig,
    pub notify: NotifyConfig,
}

impl RuntimeConfig {
    pub fn validate(&self) -> AppResult<()> {
        self.scanner
            .validate()
            .map_err(|e| AppError::Config(format!("scanner: {e}")))?;
        self.verify
            .validate()
            .map_err(|e| AppError::Config(format!("verify: {e}")))?;
        self.position
            .validate()
            .map_err(|e| AppError::Config(format!("position: {e}")))?;
        Ok(())
    }

    /// Verification settings with order sizing taken from the trading
    /// section, so the depth warning and the entry check agree.
    pub fn verify_view(&self) -> VerifyConfig {
        let trading = &self.position.trading;
        VerifyConfig {
            order_amount_usd: trading.order_amount_usd,
            leverage: trading.leverage,
            depth_levels: trading.depth_levels,
            ..self.verify.clone()
        }
    }
}

// ============================================================================
// ConfigHandle
// ============================================================================

/// Shared, hot-reloadable runtime configuration.
pub struct ConfigHandle {
    path: Option<PathBuf>,
    runtime: RwLock<RuntimeConfig>,
    modified: Mutex<Option<SystemTime>>,
}

impl ConfigHandle {
    /// `path` is polled by [`ConfigHandle::reload_if_changed`]. `None`
    /// disables reloading.
    pub fn new(path: Option<PathBuf>, runtime: RuntimeConfig) -> Self {
        let modified = path.as_deref().and_then(modified_time);
        Self {
            path,
            runtime: RwLock::new(runtime),
            modified: Mutex::new(modified),
        }
    }

    /// Handle over fixed settings.
    pub fn fixed(runtime: RuntimeConfig) -> Self {
        Self::new(None, runtime)
    }

    pub fn runtime(&self) -> RuntimeConfig {
        self.runtime.read().clone()
    }

    pub fn scanner(&self) -> ScannerConfig {
        self.runtime.read().scanner.clone()
    }

    pub fn notify(&self) -> NotifyConfig {
        self.runtime.read().notify.clone()
    }

    /// Replace the runtime settings after validating them.
    pub fn replace(&self, runtime: RuntimeConfig) -> AppResult<()> {
        runtime.validate()?;
        *self.runtime.write() = runtime;
        Ok(())
    }

    /// Re-read the file if its modification time changed.
    ///
    /// An invalid file leaves the current settings in place. Returns
    /// whether new settings were applied.
    pub fn reload_if_changed(&self) -> AppResult<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        let current = modified_time(path);
        {
            let mut last = self.modified.lock();
            if current.is_none() || current == *last {
                return Ok(false);
            }
            *last = current;
        }

        let path_str = path.to_string_lossy();
        let result = AppConfig::from_file(&path_str).and_then(|c| self.replace(c.runtime()));
        Metrics::config_reload(result.is_ok());
        match result {
            Ok(()) => {
                info!(path = %path_str, "Runtime configuration reloaded");
                Ok(true)
            }
            Err(e) => {
                warn!(path = %path_str, error = %e, "Config reload rejected, keeping current settings");
                Err(e)
            }
        }
    }
}

impl ConfigSource<VerifyConfig> for ConfigHandle {
    fn current(&self) -> VerifyConfig {
        self.runtime.read().verify_view()
    }
}

impl ConfigSource<PositionConfig> for ConfigHandle {
    fn current(&self) -> PositionConfig {
        self.runtime.read().position.clone()
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scanner.max_concurrent, 10);
        assert_eq!(config.scanner.cycle_pause_secs, 30);
        assert_eq!(config.telemetry.shutdown_timeout_secs, 30);
    }

    #[test]
    fn test_partial_file() {
        let config = AppConfig::from_toml(
            r#"
            [scanner]
            max_concurrent = 4
            min_spread_pct = 1.5

            [position.trading]
            leverage = 5

            [resolver.aggregator]
            max_pairs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.scanner.max_concurrent, 4);
        assert_eq!(config.scanner.min_spread_pct, Decimal::new(15, 1));
        assert_eq!(config.position.trading.leverage, 5);
        assert_eq!(config.resolver.aggregator.max_pairs, 5);
        assert_eq!(config.position.trading.order_amount_usd, Decimal::from(5));
    }

    #[test]
    fn test_invalid_rejected() {
        let err = AppConfig::from_toml(
            r#"
            [scanner]
            min_spread_pct = 20
            max_spread_pct = 10
            "#,
        );
        assert!(matches!(err, Err(AppError::Config(_))));
    }

    #[test]
    fn test_candidacy_band() {
        let scanner = ScannerConfig::default();
        assert!(scanner.is_candidate(Decimal::from(3)));
        assert!(scanner.is_candidate(Decimal::from(-3)));
        assert!(!scanner.is_candidate(Decimal::new(2, 1)));
        assert!(!scanner.is_candidate(Decimal::from(11)));
    }

    #[test]
    fn test_verify_view_mirrors_trading() {
        let mut runtime = RuntimeConfig::default();
        runtime.position.trading.order_amount_usd = Decimal::from(20);
        runtime.position.trading.leverage = 3;

        let handle = ConfigHandle::fixed(runtime);
        let verify: VerifyConfig = handle.current();
        assert_eq!(verify.order_amount_usd, Decimal::from(20));
        assert_eq!(verify.leverage, 3);
    }

    #[test]
    fn test_reload_on_change() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[scanner]\nmax_concurrent = 3").unwrap();
        let config = AppConfig::from_file(file.path().to_str().unwrap()).unwrap();
        let handle = ConfigHandle::new(Some(file.path().to_path_buf()), config.runtime());

        assert!(!handle.reload_if_changed().unwrap());

        let mut rewrite = std::fs::File::create(file.path()).unwrap();
        writeln!(rewrite, "[scanner]\nmax_concurrent = 7").unwrap();
        rewrite
            .set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();

        assert!(handle.reload_if_changed().unwrap());
        assert_eq!(handle.scanner().max_concurrent, 7);
    }

    #[test]
    fn test_invalid_reload_keeps_settings() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[scanner]\nmax_concurrent = 3").unwrap();
        let handle = ConfigHandle::new(
            Some(file.path().to_path_buf()),
            AppConfig::from_file(file.path().to_str().unwrap())
                .unwrap()
                .runtime(),
        );

        let mut rewrite = std::fs::File::create(file.path()).unwrap();
        writeln!(rewrite, "[scanner]\nmax_concurrent = 0").unwrap();
        rewrite
            .set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();

        assert!(handle.reload_if_changed().is_err());
        assert_eq!(handle.scanner().max_concurrent, 3);
    }
}
