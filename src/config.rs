use crate::domain::{Address, Decimal, Side};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rpc_url: String,
    pub branches: Vec<BranchConfig>,
    pub order_book_address: Option<Address>,
    pub loan_token_address: Option<Address>,
    pub order_scan_window: u64,
    pub order_fetch_concurrency: usize,
    pub borrow_fee: FeeSchedule,
    pub lend_fee: FeeSchedule,
    pub hint_seed: Option<u64>,
    /// 0 means all trials go into a single oracle call.
    pub hint_trials_per_probe: u64,
}

/// Contract addresses of one collateral branch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchConfig {
    /// Market key, e.g. "ETH" or "wstETH".
    pub key: String,
    /// Collateral index used by the ledger's shared helper contracts.
    pub index: u32,
    pub collateral_token: Address,
    pub borrower_operations: Address,
    pub trove_manager: Address,
    pub sorted_troves: Address,
    pub hint_helpers: Address,
}

/// Fee estimate parameters: `max(floor_usd, amount * bps / 10_000)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub floor_usd: Decimal,
    pub bps: Decimal,
}

impl FeeSchedule {
    /// `None` when `amount * bps` leaves the representable range.
    pub fn estimate(&self, amount: Decimal) -> Option<Decimal> {
        let proportional = amount
            .checked_mul(self.bps)?
            .checked_div(Decimal::bps_denominator())?;
        Some(self.floor_usd.max(proportional))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
    #[error("Branch not found: {0}")]
    BranchNotFound(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16, "must be a valid u16")?;

        let rpc_url = env_map
            .get("RPC_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("RPC_URL".to_string()))?;

        let branches = parse_branches_from_map(&env_map)?;

        let order_book_address = parse_address_opt(&env_map, "ORDER_BOOK_ADDRESS")?;
        let loan_token_address = parse_address_opt(&env_map, "LOAN_TOKEN_ADDRESS")?;

        let order_scan_window =
            parse_or(&env_map, "ORDER_SCAN_WINDOW", 250u64, "must be a valid u64")?;
        let order_fetch_concurrency = parse_or(
            &env_map,
            "ORDER_FETCH_CONCURRENCY",
            16usize,
            "must be a valid usize",
        )?;
        if order_fetch_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "ORDER_FETCH_CONCURRENCY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let borrow_fee = FeeSchedule {
            floor_usd: parse_decimal_or(&env_map, "BORROW_FEE_FLOOR_USD", "1")?,
            bps: parse_decimal_or(&env_map, "BORROW_FEE_BPS", "30")?,
        };
        let lend_fee = FeeSchedule {
            floor_usd: parse_decimal_or(&env_map, "LEND_FEE_FLOOR_USD", "0.5")?,
            bps: parse_decimal_or(&env_map, "LEND_FEE_BPS", "10")?,
        };

        let hint_seed = match env_map.get("HINT_SEED") {
            Some(s) => Some(s.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(
                    "HINT_SEED".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?),
            None => None,
        };
        let hint_trials_per_probe =
            parse_or(&env_map, "HINT_TRIALS_PER_PROBE", 0u64, "must be a valid u64")?;

        Ok(Config {
            port,
            rpc_url,
            branches,
            order_book_address,
            loan_token_address,
            order_scan_window,
            order_fetch_concurrency,
            borrow_fee,
            lend_fee,
            hint_seed,
            hint_trials_per_probe,
        })
    }

    /// Look up a branch by market key (case-insensitive).
    pub fn branch(&self, key: &str) -> Result<&BranchConfig, ConfigError> {
        self.branches
            .iter()
            .find(|b| b.key.eq_ignore_ascii_case(key))
            .ok_or_else(|| ConfigError::BranchNotFound(key.to_string()))
    }

    pub fn branch_by_index(&self, index: u32) -> Option<&BranchConfig> {
        self.branches.iter().find(|b| b.index == index)
    }

    pub fn fee_schedule(&self, side: Side) -> FeeSchedule {
        match side {
            Side::Borrow => self.borrow_fee,
            Side::Lend => self.lend_fee,
        }
    }
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    hint: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        Some(s) => s
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), hint.to_string())),
        None => Ok(default),
    }
}

fn parse_decimal_or(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Decimal, ConfigError> {
    let raw = env_map.get(key).map(|s| s.as_str()).unwrap_or(default);
    let value = Decimal::from_str_canonical(raw).map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), "must be a decimal number".to_string())
    })?;
    if value.inner().is_sign_negative() && !value.is_zero() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(value)
}

fn parse_address_opt(
    env_map: &HashMap<String, String>,
    key: &str,
) -> Result<Option<Address>, ConfigError> {
    match env_map.get(key).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(s) => Address::parse(s)
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(None),
    }
}

fn parse_branches_from_map(
    env_map: &HashMap<String, String>,
) -> Result<Vec<BranchConfig>, ConfigError> {
    let (key, content) = if let Some(inline) = env_map.get("BRANCHES") {
        ("BRANCHES", inline.clone())
    } else if let Some(file_path) = env_map.get("BRANCHES_FILE") {
        let content = std::fs::read_to_string(file_path).map_err(|_| {
            ConfigError::InvalidValue(
                "BRANCHES_FILE".to_string(),
                "file not found or unreadable".to_string(),
            )
        })?;
        ("BRANCHES_FILE", content)
    } else {
        return Ok(Vec::new());
    };

    let branches: Vec<BranchConfig> = serde_json::from_str(&content)
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))?;

    let mut seen = std::collections::HashSet::new();
    for branch in &branches {
        if !seen.insert(branch.index) {
            return Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("duplicate branch index {}", branch.index),
            ));
        }
    }
    Ok(branches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BRANCHES_JSON: &str = r#"[{
        "key": "ETH",
        "index": 0,
        "collateralToken": "0x0000000000000000000000000000000000000001",
        "borrowerOperations": "0x0000000000000000000000000000000000000002",
        "troveManager": "0x0000000000000000000000000000000000000003",
        "sortedTroves": "0x0000000000000000000000000000000000000004",
        "hintHelpers": "0x0000000000000000000000000000000000000005"
    }]"#;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("RPC_URL".to_string(), "http://localhost:8545".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.order_scan_window, 250);
        assert_eq!(config.order_fetch_concurrency, 16);
        assert!(config.branches.is_empty());
        assert!(config.order_book_address.is_none());
        assert!(config.hint_seed.is_none());
        assert_eq!(config.borrow_fee.bps, Decimal::from_u64(30));
    }

    #[test]
    fn test_missing_rpc_url() {
        let mut env_map = setup_required_env();
        env_map.remove("RPC_URL");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "RPC_URL"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_order_book_address() {
        let mut env_map = setup_required_env();
        env_map.insert("ORDER_BOOK_ADDRESS".to_string(), "0x1234".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "ORDER_BOOK_ADDRESS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_negative_fee_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("LEND_FEE_BPS".to_string(), "-5".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "LEND_FEE_BPS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("ORDER_FETCH_CONCURRENCY".to_string(), "0".to_string());
        assert!(Config::from_env_map(env_map).is_err());
    }

    #[test]
    fn test_inline_branches() {
        let mut env_map = setup_required_env();
        env_map.insert("BRANCHES".to_string(), BRANCHES_JSON.to_string());
        let config = Config::from_env_map(env_map).unwrap();
        let branch = config.branch("eth").unwrap();
        assert_eq!(branch.index, 0);
        assert_eq!(
            branch.sorted_troves.as_str(),
            "0x0000000000000000000000000000000000000004"
        );
        assert!(config.branch_by_index(0).is_some());
        assert!(matches!(
            config.branch("wstETH"),
            Err(ConfigError::BranchNotFound(_))
        ));
    }

    #[test]
    fn test_branches_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BRANCHES_JSON.as_bytes()).unwrap();

        let mut env_map = setup_required_env();
        env_map.insert(
            "BRANCHES_FILE".to_string(),
            file.path().to_string_lossy().to_string(),
        );
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.branches.len(), 1);
    }

    #[test]
    fn test_duplicate_branch_index_rejected() {
        let mut env_map = setup_required_env();
        let doubled = format!(
            "[{}, {}]",
            BRANCHES_JSON.trim().trim_start_matches('[').trim_end_matches(']'),
            BRANCHES_JSON.trim().trim_start_matches('[').trim_end_matches(']')
        );
        env_map.insert("BRANCHES".to_string(), doubled);
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, msg)) => {
                assert_eq!(k, "BRANCHES");
                assert!(msg.contains("duplicate"));
            }
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_fee_schedule_floor_and_proportional() {
        let fee = FeeSchedule {
            floor_usd: Decimal::from_u64(1),
            bps: Decimal::from_u64(30),
        };
        // 100 * 30 / 10_000 = 0.3 < floor
        assert_eq!(fee.estimate(Decimal::from_u64(100)), Some(Decimal::from_u64(1)));
        // 10_000 * 30 / 10_000 = 30
        assert_eq!(
            fee.estimate(Decimal::from_u64(10_000)),
            Some(Decimal::from_u64(30))
        );
    }

    #[test]
    fn test_fee_schedule_unrepresentable_amount() {
        let fee = FeeSchedule {
            floor_usd: Decimal::from_u64(1),
            bps: Decimal::from_u64(30),
        };
        let huge = Decimal::from_str_canonical("79228162514264337593543950335").unwrap();
        assert_eq!(fee.estimate(huge), None);
    }
}
