//! Weather forecast lookup, posted after a wake-up message.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt::Write as _;
use std::time::Duration;

pub const DEFAULT_FORECAST_ENDPOINT: &str = "http://weather.livedoor.com/forecast/webservice/json/v1";

/// Tokyo.
pub const DEFAULT_CITY: u32 = 130010;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forecast {
    pub date: String,
    pub label: String,
    pub temp_high: Option<String>,
    pub temp_low: Option<String>,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    forecasts: Vec<Entry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Entry {
    #[serde(default)]
    date_label: String,
    #[serde(default)]
    telop: String,
    #[serde(default)]
    temperature: Temperature,
}

#[derive(Default, Deserialize)]
struct Temperature {
    max: Option<Reading>,
    min: Option<Reading>,
}

#[derive(Deserialize)]
struct Reading {
    celsius: Option<String>,
}

impl From<Entry> for Forecast {
    fn from(e: Entry) -> Self {
        let celsius = |r: Option<Reading>| r.and_then(|r| r.celsius).filter(|c| !c.is_empty());
        Forecast {
            date: e.date_label,
            label: e.telop,
            temp_high: celsius(e.temperature.max),
            temp_low: celsius(e.temperature.min),
        }
    }
}

fn parse(body: &[u8]) -> Result<Vec<Forecast>> {
    let resp: Response = serde_json::from_slice(body)?;
    Ok(resp.forecasts.into_iter().map(Forecast::from).collect())
}

/// One line per day: `今日は 晴れ (20°C / 12°C)`.
pub fn format_forecasts(forecasts: &[Forecast]) -> String {
    let mut msg = String::new();
    for f in forecasts {
        let _ = write!(msg, "{}は {}", f.date, f.label);
        if let Some(high) = &f.temp_high {
            let low = f.temp_low.as_deref().unwrap_or("");
            let _ = write!(msg, " ({}°C / {}°C)", high, low);
        }
        msg.push('\n');
    }
    msg
}

#[derive(Clone)]
pub struct ForecastClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ForecastClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub async fn request(&self, city: u32) -> Result<Vec<Forecast>> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("city", city)])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.bytes().await?;
        if !status.is_success() {
            return Err(Error::Upstream {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        parse(&body)
    }
}
