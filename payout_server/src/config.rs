use std::{env, fmt::Display, str::FromStr};

use chrono::Duration;
use log::*;
use payout_common::{helpers::parse_boolean_flag, Cents, DEFAULT_CURRENCY_CODE};
use payout_engine::{earnings::FeeSchedule, payout_objects::SettlementConfig};
use rust_decimal::Decimal;

const DEFAULT_VPS_HOST: &str = "127.0.0.1";
const DEFAULT_VPS_PORT: u16 = 8460;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/vendor_payouts.db";
const DEFAULT_HOLDING_PERIOD_DAYS: i64 = 14;
const DEFAULT_SETTLEMENT_INTERVAL_SECS: u64 = 86_400;
const DEFAULT_RAIL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STUCK_PAYOUT_MINUTES: i64 = 60;
const MAX_RAIL_TIMEOUT_SECS: u64 = 3600;
const MAX_STUCK_PAYOUT_MINUTES: i64 = 60 * 24 * 365;
const DEFAULT_SIMULATED_RAIL_BALANCE: i64 = 100_000_000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RailMode {
    /// Talk to the payment rail's REST API
    Rest,
    /// Use the in-memory rail. Nothing leaves the process.
    #[default]
    Simulated,
}

impl FromStr for RailMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rest" => Ok(Self::Rest),
            "simulated" | "sim" => Ok(Self::Simulated),
            other => Err(format!("'{other}' is not a rail mode. Use 'rest' or 'simulated'.")),
        }
    }
}

impl Display for RailMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rest => f.write_str("rest"),
            Self::Simulated => f.write_str("simulated"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Time between a sale and the earliest moment its payout may be transferred.
    pub holding_period: Duration,
    /// Time between two runs of the settlement worker.
    pub settlement_interval: std::time::Duration,
    /// If true, a settlement run is started as soon as the server is up, rather than after the first interval.
    pub run_settlement_on_startup: bool,
    pub fees: FeeSchedule,
    pub currency: String,
    pub rail_timeout: std::time::Duration,
    /// A payout that has been `processing` for longer than this is reconciled at the start of the next run.
    pub stuck_after: Duration,
    pub low_balance_threshold: Cents,
    pub rail_mode: RailMode,
    /// The opening aggregator balance when running against the simulated rail.
    pub simulated_rail_balance: Cents,
    /// Vendor messages and operator alerts are POSTed to this URL. If `None`, they are only written to the log.
    pub alert_webhook_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_VPS_HOST.to_string(),
            port: DEFAULT_VPS_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            holding_period: Duration::days(DEFAULT_HOLDING_PERIOD_DAYS),
            settlement_interval: std::time::Duration::from_secs(DEFAULT_SETTLEMENT_INTERVAL_SECS),
            run_settlement_on_startup: false,
            fees: FeeSchedule::default(),
            currency: DEFAULT_CURRENCY_CODE.to_string(),
            rail_timeout: std::time::Duration::from_secs(DEFAULT_RAIL_TIMEOUT_SECS),
            stuck_after: Duration::minutes(DEFAULT_STUCK_PAYOUT_MINUTES),
            low_balance_threshold: Cents::ZERO,
            rail_mode: RailMode::default(),
            simulated_rail_balance: Cents::from(DEFAULT_SIMULATED_RAIL_BALANCE),
            alert_webhook_url: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from `lookup`, which maps a variable name to its value. Missing or unparseable values
    /// fall back to their defaults, with a log message saying so.
    pub fn from_lookup<F>(lookup: F) -> Self
    where F: Fn(&str) -> Option<String> {
        let defaults = Self::default();
        let host = lookup("VPS_HOST").unwrap_or_else(|| {
            info!("🪛️ VPS_HOST is not set. Using the default value of {DEFAULT_VPS_HOST}.");
            defaults.host.clone()
        });
        let port = parse_or_default("VPS_PORT", lookup("VPS_PORT"), DEFAULT_VPS_PORT);
        let database_url = lookup("VPS_DATABASE_URL").unwrap_or_else(|| {
            warn!("🪛️ VPS_DATABASE_URL is not set. Using the default value of {DEFAULT_DATABASE_URL}.");
            defaults.database_url.clone()
        });
        let holding_days =
            parse_or_default("VPS_HOLDING_PERIOD_DAYS", lookup("VPS_HOLDING_PERIOD_DAYS"), DEFAULT_HOLDING_PERIOD_DAYS);
        let holding_period = if holding_days < 0 {
            warn!("🪛️ VPS_HOLDING_PERIOD_DAYS cannot be negative. Using the default of {DEFAULT_HOLDING_PERIOD_DAYS}.");
            defaults.holding_period
        } else {
            Duration::days(holding_days)
        };
        let interval_secs = parse_or_default(
            "VPS_SETTLEMENT_INTERVAL_SECS",
            lookup("VPS_SETTLEMENT_INTERVAL_SECS"),
            DEFAULT_SETTLEMENT_INTERVAL_SECS,
        );
        let settlement_interval = if interval_secs == 0 {
            warn!("🪛️ VPS_SETTLEMENT_INTERVAL_SECS must be positive. Using the default of {DEFAULT_SETTLEMENT_INTERVAL_SECS}.");
            defaults.settlement_interval
        } else {
            std::time::Duration::from_secs(interval_secs)
        };
        let run_settlement_on_startup = parse_boolean_flag(lookup("VPS_RUN_SETTLEMENT_ON_STARTUP"), false);
        let fees = configure_fees(&lookup);
        let currency = lookup("VPS_CURRENCY").map(|s| s.trim().to_ascii_uppercase()).unwrap_or_else(|| {
            info!("🪛️ VPS_CURRENCY is not set. Using the default value of {DEFAULT_CURRENCY_CODE}.");
            defaults.currency.clone()
        });
        let rail_timeout_secs =
            parse_or_default("VPS_RAIL_TIMEOUT_SECS", lookup("VPS_RAIL_TIMEOUT_SECS"), DEFAULT_RAIL_TIMEOUT_SECS);
        if rail_timeout_secs > MAX_RAIL_TIMEOUT_SECS {
            warn!("🪛️ VPS_RAIL_TIMEOUT_SECS of {rail_timeout_secs} is too long. Using {MAX_RAIL_TIMEOUT_SECS} seconds.");
        }
        let rail_timeout_secs = rail_timeout_secs.clamp(1, MAX_RAIL_TIMEOUT_SECS);
        let rail_timeout = std::time::Duration::from_secs(rail_timeout_secs);
        let stuck_minutes = parse_or_default(
            "VPS_STUCK_PAYOUT_MINUTES",
            lookup("VPS_STUCK_PAYOUT_MINUTES"),
            DEFAULT_STUCK_PAYOUT_MINUTES,
        )
        .clamp(1, MAX_STUCK_PAYOUT_MINUTES);
        // A payout still waiting on the rail must never be reported as stuck
        let min_stuck_minutes = (rail_timeout_secs / 60 + 1) as i64;
        let stuck_minutes = if stuck_minutes < min_stuck_minutes {
            warn!(
                "🪛️ VPS_STUCK_PAYOUT_MINUTES of {stuck_minutes} is not longer than the rail timeout of \
                 {rail_timeout_secs}s. Using {min_stuck_minutes} minutes."
            );
            min_stuck_minutes
        } else {
            stuck_minutes
        };
        let stuck_after = Duration::minutes(stuck_minutes);
        let low_balance_threshold =
            Cents::from(parse_or_default("VPS_LOW_BALANCE_THRESHOLD", lookup("VPS_LOW_BALANCE_THRESHOLD"), 0i64));
        let rail_mode = parse_or_default("VPS_RAIL_MODE", lookup("VPS_RAIL_MODE"), RailMode::default());
        let simulated_rail_balance = Cents::from(parse_or_default(
            "VPS_SIMULATED_RAIL_BALANCE",
            lookup("VPS_SIMULATED_RAIL_BALANCE"),
            DEFAULT_SIMULATED_RAIL_BALANCE,
        ));
        let alert_webhook_url = lookup("VPS_ALERT_WEBHOOK_URL").filter(|s| !s.trim().is_empty());
        if alert_webhook_url.is_none() {
            info!("🪛️ VPS_ALERT_WEBHOOK_URL is not set. Notifications and alerts will only be logged.");
        }
        Self {
            host,
            port,
            database_url,
            holding_period,
            settlement_interval,
            run_settlement_on_startup,
            fees,
            currency,
            rail_timeout,
            stuck_after,
            low_balance_threshold,
            rail_mode,
            simulated_rail_balance,
            alert_webhook_url,
        }
    }

    /// The part of the configuration that the settlement engine cares about.
    pub fn settlement_config(&self) -> SettlementConfig {
        SettlementConfig {
            holding_period: self.holding_period,
            fees: self.fees.clone(),
            currency: self.currency.clone(),
            rail_timeout: self.rail_timeout,
            stuck_after: self.stuck_after,
            low_balance_threshold: self.low_balance_threshold,
        }
    }
}

fn configure_fees<F>(lookup: &F) -> FeeSchedule
where F: Fn(&str) -> Option<String> {
    let defaults = FeeSchedule::default();
    let processing_rate =
        parse_or_default::<Decimal>("VPS_PROCESSING_FEE_RATE", lookup("VPS_PROCESSING_FEE_RATE"), defaults.processing_rate);
    let processing_fixed = parse_or_default::<i64>(
        "VPS_PROCESSING_FEE_FIXED",
        lookup("VPS_PROCESSING_FEE_FIXED"),
        defaults.processing_fixed.value(),
    );
    let transfer_fee =
        parse_or_default::<i64>("VPS_TRANSFER_FEE", lookup("VPS_TRANSFER_FEE"), defaults.transfer_fee.value());
    let fees = FeeSchedule::new(processing_rate, Cents::from(processing_fixed), Cents::from(transfer_fee));
    match fees.validate() {
        Ok(()) => fees,
        Err(e) => {
            error!("🪛️ The configured fee schedule is invalid. {e}. Using the default fee schedule instead.");
            defaults
        },
    }
}

fn parse_or_default<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match value {
        None => {
            info!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {name} ({s}). {e} Using the default value of {default}.");
            default
        }),
    }
}
