use crate::engine::RiskLimits;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub exchange_gateway_url: String,
    pub decision_provider_url: String,
    pub initial_balance: f64,
    pub scan_interval_minutes: u64,
    pub candidate_symbols: Vec<String>,
    pub kline_interval: String,
    pub kline_limit: usize,
    pub btc_eth_leverage: u32,
    pub altcoin_leverage: u32,
    pub max_positions: usize,
    pub max_daily_loss_pct: f64,
    pub max_drawdown_pct: f64,
    pub stop_trading_minutes: i64,
    pub ai_learning_enabled: bool,
    pub ai_learning_interval: u64,
    pub performance_lookback_cycles: usize,
    pub premature_exit_minutes: i64,
    pub position_settle_minutes: i64,
    pub order_spacing_ms: u64,
    pub call_timeout_secs: u64,
    pub cycle_timeout_secs: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

const QUOTE_ASSETS: [&str; 4] = ["USDT", "USDC", "BUSD", "USD"];

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = required(&env_map, "DATABASE_PATH")?;
        let exchange_gateway_url = required(&env_map, "EXCHANGE_GATEWAY_URL")?;
        let decision_provider_url = required(&env_map, "DECISION_PROVIDER_URL")?;

        let initial_balance: f64 = required(&env_map, "INITIAL_BALANCE")?
            .parse()
            .map_err(|_| invalid("INITIAL_BALANCE", "must be a number"))?;
        if !(initial_balance.is_finite() && initial_balance > 0.0) {
            return Err(invalid("INITIAL_BALANCE", "must be positive"));
        }

        let candidate_symbols: Vec<String> = env_map
            .get("CANDIDATE_SYMBOLS")
            .map(|s| s.as_str())
            .unwrap_or("BTCUSDT,ETHUSDT")
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if candidate_symbols.is_empty() {
            return Err(invalid("CANDIDATE_SYMBOLS", "must list at least one symbol"));
        }

        let ai_learning_enabled = match env_map
            .get("AI_LEARNING_ENABLED")
            .map(|s| s.to_ascii_lowercase())
            .as_deref()
            .unwrap_or("false")
        {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "AI_LEARNING_ENABLED".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        let config = Config {
            database_path,
            exchange_gateway_url,
            decision_provider_url,
            initial_balance,
            scan_interval_minutes: parse_or(&env_map, "SCAN_INTERVAL_MINUTES", 3)?,
            candidate_symbols,
            kline_interval: env_map
                .get("KLINE_INTERVAL")
                .cloned()
                .unwrap_or_else(|| "3m".to_string()),
            kline_limit: parse_or(&env_map, "KLINE_LIMIT", 100)?,
            btc_eth_leverage: parse_or(&env_map, "BTC_ETH_LEVERAGE", 5)?,
            altcoin_leverage: parse_or(&env_map, "ALTCOIN_LEVERAGE", 5)?,
            max_positions: parse_or(&env_map, "MAX_POSITIONS", 3)?,
            max_daily_loss_pct: parse_or(&env_map, "MAX_DAILY_LOSS_PCT", 10.0)?,
            max_drawdown_pct: parse_or(&env_map, "MAX_DRAWDOWN_PCT", 20.0)?,
            stop_trading_minutes: parse_or(&env_map, "STOP_TRADING_MINUTES", 60)?,
            ai_learning_enabled,
            ai_learning_interval: parse_or(&env_map, "AI_LEARNING_INTERVAL", 10)?,
            performance_lookback_cycles: parse_or(&env_map, "PERFORMANCE_LOOKBACK_CYCLES", 100)?,
            premature_exit_minutes: parse_or(&env_map, "PREMATURE_EXIT_MINUTES", 15)?,
            position_settle_minutes: parse_or(&env_map, "POSITION_SETTLE_MINUTES", 10)?,
            order_spacing_ms: parse_or(&env_map, "ORDER_SPACING_MS", 1000)?,
            call_timeout_secs: parse_or(&env_map, "CALL_TIMEOUT_SECS", 30)?,
            cycle_timeout_secs: parse_or(&env_map, "CYCLE_TIMEOUT_SECS", 150)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("SCAN_INTERVAL_MINUTES", self.scan_interval_minutes),
            ("AI_LEARNING_INTERVAL", self.ai_learning_interval),
            ("CALL_TIMEOUT_SECS", self.call_timeout_secs),
            ("CYCLE_TIMEOUT_SECS", self.cycle_timeout_secs),
            ("KLINE_LIMIT", self.kline_limit as u64),
            ("MAX_POSITIONS", self.max_positions as u64),
            ("BTC_ETH_LEVERAGE", self.btc_eth_leverage as u64),
            ("ALTCOIN_LEVERAGE", self.altcoin_leverage as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(invalid(key, "must be greater than zero"));
            }
        }
        for (key, value) in [
            ("STOP_TRADING_MINUTES", self.stop_trading_minutes),
            ("POSITION_SETTLE_MINUTES", self.position_settle_minutes),
        ] {
            if value < 0 {
                return Err(invalid(key, "must not be negative"));
            }
        }
        Ok(())
    }

    /// Leverage cap for the asset class of `symbol`.
    pub fn leverage_cap(&self, symbol: &str) -> u32 {
        if is_btc_or_eth(symbol) {
            self.btc_eth_leverage
        } else {
            self.altcoin_leverage
        }
    }

    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            max_daily_loss_pct: self.max_daily_loss_pct,
            max_drawdown_pct: self.max_drawdown_pct,
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_minutes * 60)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    /// How long position reads may lag our own opens and closes.
    pub fn settle_window_ms(&self) -> i64 {
        self.position_settle_minutes * 60_000
    }

    pub fn order_spacing(&self) -> Duration {
        Duration::from_millis(self.order_spacing_ms)
    }
}

fn is_btc_or_eth(symbol: &str) -> bool {
    let upper = symbol.to_ascii_uppercase();
    let base = QUOTE_ASSETS
        .iter()
        .find_map(|quote| upper.strip_suffix(quote))
        .unwrap_or(&upper);
    base == "BTC" || base == "ETH"
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| invalid(key, &format!("cannot parse {:?}", raw))),
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue(key.to_string(), message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert(
            "EXCHANGE_GATEWAY_URL".to_string(),
            "http://localhost:8090".to_string(),
        );
        map.insert(
            "DECISION_PROVIDER_URL".to_string(),
            "http://localhost:8091".to_string(),
        );
        map.insert("INITIAL_BALANCE".to_string(), "1000".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.scan_interval_minutes, 3);
        assert_eq!(config.candidate_symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(config.kline_interval, "3m");
        assert_eq!(config.max_positions, 3);
        assert_eq!(config.max_daily_loss_pct, 10.0);
        assert_eq!(config.max_drawdown_pct, 20.0);
        assert_eq!(config.stop_trading_minutes, 60);
        assert!(!config.ai_learning_enabled);
        assert_eq!(config.ai_learning_interval, 10);
        assert_eq!(config.scan_interval(), Duration::from_secs(180));
        assert_eq!(config.settle_window_ms(), 10 * 60_000);
    }

    #[test]
    fn test_negative_settle_window_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("POSITION_SETTLE_MINUTES".to_string(), "-1".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(k, _)) if k == "POSITION_SETTLE_MINUTES"
        ));
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_initial_balance() {
        let mut env_map = setup_required_env();
        env_map.remove("INITIAL_BALANCE");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "INITIAL_BALANCE"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_negative_initial_balance() {
        let mut env_map = setup_required_env();
        env_map.insert("INITIAL_BALANCE".to_string(), "-5".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "INITIAL_BALANCE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_scan_interval() {
        let mut env_map = setup_required_env();
        env_map.insert("SCAN_INTERVAL_MINUTES".to_string(), "soon".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "SCAN_INTERVAL_MINUTES"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_learning_interval_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("AI_LEARNING_INTERVAL".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(k, _)) if k == "AI_LEARNING_INTERVAL"
        ));
    }

    #[test]
    fn test_invalid_learning_flag() {
        let mut env_map = setup_required_env();
        env_map.insert("AI_LEARNING_ENABLED".to_string(), "maybe".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "AI_LEARNING_ENABLED"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_candidate_symbols_are_normalized() {
        let mut env_map = setup_required_env();
        env_map.insert(
            "CANDIDATE_SYMBOLS".to_string(),
            " solusdt, BTCUSDT ,,".to_string(),
        );
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.candidate_symbols, vec!["SOLUSDT", "BTCUSDT"]);
    }

    #[test]
    fn test_leverage_cap_by_asset_class() {
        let mut env_map = setup_required_env();
        env_map.insert("BTC_ETH_LEVERAGE".to_string(), "10".to_string());
        env_map.insert("ALTCOIN_LEVERAGE".to_string(), "3".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.leverage_cap("BTCUSDT"), 10);
        assert_eq!(config.leverage_cap("ethusdc"), 10);
        assert_eq!(config.leverage_cap("SOLUSDT"), 3);
        assert_eq!(config.leverage_cap("ETHFIUSDT"), 3);
    }
}
