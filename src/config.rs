//! Command-line / environment configuration for `awake-bot serve`.

use crate::forecast::{DEFAULT_CITY, DEFAULT_FORECAST_ENDPOINT};
use crate::holiday;
use crate::messaging::DEFAULT_LINE_API_BASE;
use crate::policy::DEFAULT_RETRY_LIMIT;
use chrono::NaiveDate;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: u16,

    /// Channel secret used to verify webhook signatures
    #[arg(long, env = "LINE_CHANNEL_SECRET", hide_env_values = true)]
    pub channel_secret: String,

    /// Channel access token for the Messaging API
    #[arg(long, env = "LINE_CHANNEL_TOKEN", hide_env_values = true)]
    pub channel_token: String,

    /// Shared secret callers of /push and /sessions must present
    #[arg(long, env = "AWAKE_BOT_TOKEN", hide_env_values = true)]
    pub push_token: String,

    /// Reminders sent before giving up
    #[arg(
        long,
        env = "AWAKE_BOT_RETRY_LIMIT",
        default_value_t = DEFAULT_RETRY_LIMIT,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub retry_limit: u32,

    /// Do not push or monitor on weekends and holidays
    #[arg(long, env = "AWAKE_BOT_SKIP_HOLIDAYS")]
    pub skip_holidays: bool,

    /// City code for the forecast sent after a wake-up message
    #[arg(long, default_value_t = DEFAULT_CITY)]
    pub forecast_city: u32,

    /// Do not send forecasts
    #[arg(long)]
    pub no_forecast: bool,

    #[arg(long, default_value = DEFAULT_FORECAST_ENDPOINT)]
    pub forecast_endpoint: String,

    #[arg(long, default_value = DEFAULT_LINE_API_BASE)]
    pub line_api_base: String,

    /// Directory served under /static
    #[arg(long, default_value = "static")]
    pub static_dir: PathBuf,

    /// Timeout for each outbound HTTP request, in seconds
    #[arg(long, default_value_t = 10)]
    pub send_timeout_secs: u64,
}

/// Settings the HTTP handlers need at request time.
#[derive(Debug, Clone)]
pub struct Config {
    pub channel_secret: String,
    pub push_token: String,
    pub skip_holidays: bool,
    /// `None` disables forecasts.
    pub forecast_city: Option<u32>,
    pub static_dir: PathBuf,
    /// Date the holiday check runs against.
    pub today: fn() -> NaiveDate,
}

impl ServeArgs {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn config(&self) -> Config {
        Config {
            channel_secret: self.channel_secret.clone(),
            push_token: self.push_token.clone(),
            skip_holidays: self.skip_holidays,
            forecast_city: (!self.no_forecast).then_some(self.forecast_city),
            static_dir: self.static_dir.clone(),
            today: holiday::today,
        }
    }
}
