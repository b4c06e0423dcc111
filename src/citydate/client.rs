// citydate - Daily weather statistics per city and date
//
// Copyright 2024 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use chrono::NaiveDate;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    UnknownCity(String),
    Unexpected(StatusCode, Url),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::UnknownCity(c) => write!(f, "no data found for city {}", c),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            _ => None,
        }
    }
}

/// Wrap a reqwest error without its request URL since the query string carries the API key.
fn internal(e: reqwest::Error) -> ClientError {
    ClientError::Internal(e.without_url())
}

/// Client for the OpenWeather direct geocoding and One Call day summary APIs.
///
/// Both endpoints are authenticated with the same API key, passed as the `appid`
/// query parameter. URLs are kept without a query string so that they can be logged
/// and included in errors without leaking the key.
#[derive(Debug)]
pub struct OpenWeatherClient {
    client: Client,
    api_key: String,
    geocoding_url: Url,
    day_summary_url: Url,
}

impl OpenWeatherClient {
    const USER_AGENT: &'static str = "citydate (https://github.com/56quarters/citydate)";
    const JSON_RESPONSE: &'static str = "application/json";
    const UNITS: &'static str = "metric";

    pub fn new(client: Client, api_key: &str, geocoding_url: Url, day_summary_url: Url) -> Self {
        OpenWeatherClient {
            client,
            api_key: api_key.to_owned(),
            geocoding_url,
            day_summary_url,
        }
    }

    /// Resolve a city name to the coordinates of the single best match.
    ///
    /// Returns `ClientError::UnknownCity` if the provider has no match for the name.
    pub async fn geocode(&self, city: &str) -> Result<Coordinates, ClientError> {
        tracing::debug!(message = "making geocoding request", url = %self.geocoding_url, city = %city);

        let query = [("q", city), ("limit", "1"), ("appid", self.api_key.as_str())];
        let res = self.make_request(&self.geocoding_url, &query).await?;
        let mut places = res.json::<Vec<Coordinates>>().await.map_err(internal)?;

        if places.is_empty() {
            Err(ClientError::UnknownCity(city.to_owned()))
        } else {
            Ok(places.swap_remove(0))
        }
    }

    /// Fetch the aggregated weather for a single day at the given location in metric units.
    pub async fn day_summary(&self, coords: &Coordinates, date: NaiveDate) -> Result<DaySummary, ClientError> {
        tracing::debug!(
            message = "making day summary request",
            url = %self.day_summary_url,
            lat = coords.lat,
            lon = coords.lon,
            date = %date,
        );

        let lat = coords.lat.to_string();
        let lon = coords.lon.to_string();
        let date = date.format("%Y-%m-%d").to_string();
        let query = [
            ("lat", lat.as_str()),
            ("lon", lon.as_str()),
            ("date", date.as_str()),
            ("appid", self.api_key.as_str()),
            ("units", Self::UNITS),
        ];

        let res = self.make_request(&self.day_summary_url, &query).await?;
        res.json::<DaySummary>().await.map_err(internal)
    }

    async fn make_request(&self, url: &Url, query: &[(&str, &str)]) -> Result<Response, ClientError> {
        let res = self
            .client
            .get(url.clone())
            .query(query)
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await
            .map_err(internal)?;

        let status = res.status();
        if status.is_success() {
            Ok(res)
        } else {
            Err(ClientError::Unexpected(status, url.clone()))
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DaySummary {
    pub temperature: Temperature,
    pub humidity: Humidity,
}

impl DaySummary {
    /// Reduce the provider summary to the values stored for a city and date.
    ///
    /// The average temperature is the mean of the four period readings. Humidity is
    /// the afternoon reading, the provider does not supply a daily mean.
    pub fn stats(&self) -> DailyStats {
        let t = &self.temperature;
        DailyStats {
            min_temp: t.min,
            max_temp: t.max,
            avg_temp: (t.morning + t.afternoon + t.evening + t.night) / 4.0,
            humidity: self.humidity.afternoon,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Temperature {
    pub min: f64,
    pub max: f64,
    pub morning: f64,
    pub afternoon: f64,
    pub evening: f64,
    pub night: f64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Humidity {
    pub afternoon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyStats {
    pub min_temp: f64,
    pub max_temp: f64,
    pub avg_temp: f64,
    pub humidity: f64,
}
