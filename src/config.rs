// src/config.rs
use alloy::primitives::Address;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use clap::Parser;
use eyre::{eyre, Result, WrapErr};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_FUTURES_CONTRACT: &str = "0x8464dc5ab80e76e497fad318fe6d444408e5ccda";
pub const DEFAULT_MARKET_MAKER_WALLET: &str = "0xc1e187E4a677Da017ecfAc011C9d381c3E7baeE4";

/// Analyze market maker fees on the futures contract
#[derive(Parser, Debug, Clone)]
#[command(name = "mm-fee-analyzer", version, long_about = None)]
pub struct Cli {
    /// Arbiscan/Etherscan API key
    #[arg(long, env = "ARBISCAN_API_KEY", hide_env_values = true)]
    pub arbiscan_api_key: Option<String>,

    /// Alchemy (JSON-RPC) node URL for Arbitrum
    #[arg(long, env = "ALCHEMY_URL", hide_env_values = true)]
    pub alchemy_url: Option<String>,

    /// Futures contract address
    #[arg(long, env = "FUTURES_CONTRACT", default_value = DEFAULT_FUTURES_CONTRACT)]
    pub futures_contract: String,

    /// Market maker wallet address
    #[arg(long, env = "MARKET_MAKER_WALLET", default_value = DEFAULT_MARKET_MAKER_WALLET)]
    pub market_maker_wallet: String,

    /// Decimals of the margin token
    #[arg(long, env = "TOKEN_DECIMALS", default_value_t = 6)]
    pub token_decimals: u32,

    /// Analyze ALL wallets interacting with the contract
    #[arg(short = 'a', long = "all")]
    pub all: bool,

    /// Exclude the market maker wallet (use with --all to see other traders only)
    #[arg(short = 'n', long = "nomm")]
    pub nomm: bool,

    /// Also write an hourly summary CSV (<output>_hourly.csv)
    #[arg(short = 'H', long)]
    pub hourly: bool,

    /// Start date (YYYY-MM-DD), defaults to seven days ago
    #[arg(long)]
    pub start_date: Option<String>,

    /// End date (YYYY-MM-DD), defaults to today
    #[arg(long)]
    pub end_date: Option<String>,

    /// Analyze a single transaction by hash
    #[arg(long)]
    pub tx: Option<String>,

    /// Output CSV file path
    #[arg(short, long, default_value = "market_maker_fees.csv")]
    pub output: PathBuf,

    /// Suppress progress output and the summary
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    SingleWallet(Address),
    AllWallets { exclude: Option<Address> },
}

impl RunMode {
    /// Wallet the run is scoped to, if any.
    pub fn wallet(&self) -> Option<Address> {
        match self {
            RunMode::SingleWallet(w) => Some(*w),
            RunMode::AllWallets { .. } => None,
        }
    }

    pub fn excluded(&self) -> Option<Address> {
        match self {
            RunMode::SingleWallet(_) => None,
            RunMode::AllWallets { exclude } => *exclude,
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::SingleWallet(wallet) => write!(f, "MARKET MAKER {}", wallet),
            RunMode::AllWallets { exclude: Some(wallet) } => write!(f, "ALL WALLETS (excluding {})", wallet),
            RunMode::AllWallets { exclude: None } => f.write_str("ALL WALLETS"),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub arbiscan_api_key: String,
    pub rpc_http_url: String,
    pub futures_contract: Address,
    pub market_maker_wallet: Address,
    pub token_decimals: u32,
    pub mode: RunMode,
    pub hourly: bool,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub tx: Option<String>,
    pub output: PathBuf,
    pub quiet: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("arbiscan_api_key", &"<redacted>")
            .field("rpc_http_url", &"<redacted>")
            .field("futures_contract", &self.futures_contract)
            .field("market_maker_wallet", &self.market_maker_wallet)
            .field("token_decimals", &self.token_decimals)
            .field("mode", &self.mode)
            .field("hourly", &self.hourly)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("tx", &self.tx)
            .field("output", &self.output)
            .field("quiet", &self.quiet)
            .finish()
    }
}

/// Load `.env`, then parse the command line (which falls back to env vars).
pub fn load() -> Result<Config> {
    dotenvy::dotenv().ok();
    Config::from_cli(Cli::parse(), Utc::now())
}

fn parse_address(what: &str, s: &str) -> Result<Address> {
    Address::from_str(s.trim()).wrap_err_with(|| format!("invalid {} address {:?}", what, s))
}

fn parse_date(what: &str, s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .wrap_err_with(|| format!("invalid {} {:?}, expected YYYY-MM-DD", what, s))
}

impl Config {
    /// Validate raw arguments. `now` anchors the default date range.
    pub fn from_cli(cli: Cli, now: DateTime<Utc>) -> Result<Self> {
        let arbiscan_api_key = cli
            .arbiscan_api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| eyre!("Arbiscan API key is required. Set via --arbiscan-api-key or ARBISCAN_API_KEY env var."))?;
        let rpc_http_url = cli
            .alchemy_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| eyre!("Alchemy URL is required. Set via --alchemy-url or ALCHEMY_URL env var."))?;

        let futures_contract = parse_address("futures contract", &cli.futures_contract)?;
        let market_maker_wallet = parse_address("market maker wallet", &cli.market_maker_wallet)?;

        let mode = if cli.all {
            RunMode::AllWallets {
                exclude: cli.nomm.then_some(market_maker_wallet),
            }
        } else {
            RunMode::SingleWallet(market_maker_wallet)
        };

        let today = now.date_naive();
        let start_day = match &cli.start_date {
            Some(s) => parse_date("start date", s)?,
            None => today
                .checked_sub_days(Days::new(7))
                .ok_or_else(|| eyre!("cannot compute default start date"))?,
        };
        let end_day = match &cli.end_date {
            Some(s) => parse_date("end date", s)?,
            None => today,
        };

        let start = start_day.and_time(NaiveTime::MIN).and_utc();
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).ok_or_else(|| eyre!("invalid end of day"))?;
        let end = end_day.and_time(end_of_day).and_utc();
        if start > end {
            return Err(eyre!("start date {} is after end date {}", start_day, end_day));
        }

        Ok(Config {
            arbiscan_api_key,
            rpc_http_url,
            futures_contract,
            market_maker_wallet,
            token_decimals: cli.token_decimals,
            mode,
            hourly: cli.hourly,
            start,
            end,
            tx: cli.tx,
            output: cli.output,
            quiet: cli.quiet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 16, 15, 30, 0).unwrap()
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec![
            "mm-fee-analyzer",
            "--arbiscan-api-key",
            "key",
            "--alchemy-url",
            "http://localhost:8545",
            "--futures-contract",
            DEFAULT_FUTURES_CONTRACT,
            "--market-maker-wallet",
            "0xc1e187e4a677da017ecfac011c9d381c3e7baee4",
        ];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_cover_the_last_week() {
        let cfg = Config::from_cli(cli(&[]), now()).unwrap();
        assert_eq!(cfg.start, Utc.with_ymd_and_hms(2026, 1, 9, 0, 0, 0).unwrap());
        assert_eq!(cfg.end, Utc.with_ymd_and_hms(2026, 1, 16, 23, 59, 59).unwrap());
        assert_eq!(cfg.token_decimals, 6);
        assert_eq!(cfg.output, PathBuf::from("market_maker_fees.csv"));
        assert!(matches!(cfg.mode, RunMode::SingleWallet(_)));
    }

    #[test]
    fn all_wallets_with_exclusion() {
        let cfg = Config::from_cli(cli(&["--all", "--nomm", "-H"]), now()).unwrap();
        assert_eq!(
            cfg.mode,
            RunMode::AllWallets {
                exclude: Some(cfg.market_maker_wallet)
            }
        );
        assert_eq!(cfg.mode.wallet(), None);
        assert!(cfg.hourly);

        let cfg = Config::from_cli(cli(&["-a"]), now()).unwrap();
        assert_eq!(cfg.mode.excluded(), None);
    }

    #[test]
    fn mode_banner_names_the_scope() {
        let cfg = Config::from_cli(cli(&[]), now()).unwrap();
        assert_eq!(
            cfg.mode.to_string(),
            format!("MARKET MAKER {}", cfg.market_maker_wallet)
        );

        let cfg = Config::from_cli(cli(&["--all", "--nomm"]), now()).unwrap();
        assert_eq!(
            cfg.mode.to_string(),
            format!("ALL WALLETS (excluding {})", cfg.market_maker_wallet)
        );

        let cfg = Config::from_cli(cli(&["--all"]), now()).unwrap();
        assert_eq!(cfg.mode.to_string(), "ALL WALLETS");
    }

    #[test]
    fn explicit_dates() {
        let cfg = Config::from_cli(
            cli(&["--start-date", "2026-01-01", "--end-date", "2026-01-02"]),
            now(),
        )
        .unwrap();
        assert_eq!(cfg.start, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(cfg.end, Utc.with_ymd_and_hms(2026, 1, 2, 23, 59, 59).unwrap());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Config::from_cli(cli(&["--start-date", "01/01/2026"]), now()).is_err());
        assert!(Config::from_cli(
            cli(&["--start-date", "2026-01-05", "--end-date", "2026-01-01"]),
            now()
        )
        .is_err());

        let mut short_contract = cli(&[]);
        short_contract.futures_contract = "0x1234".to_string();
        assert!(Config::from_cli(short_contract, now()).is_err());

        let mut missing_key = cli(&[]);
        missing_key.arbiscan_api_key = Some("  ".to_string());
        assert!(Config::from_cli(missing_key, now()).is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let cfg = Config::from_cli(cli(&[]), now()).unwrap();
        let dbg = format!("{:?}", cfg);
        assert!(!dbg.contains("key\""));
        assert!(!dbg.contains("localhost"));
    }
}
