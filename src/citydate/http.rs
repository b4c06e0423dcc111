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

use crate::client::{ClientError, OpenWeatherClient};
use crate::metrics::{ApiMetrics, Endpoint};
use crate::store::{RecordStore, StoreError, WeatherRecord};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const MAX_CITY_CHARS: usize = 100;
const DATE_FORMAT_MSG: &str = "Date must be in yyyy-mm-dd format";
const OPENMETRICS_TEXT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Everything a request handler needs, shared between all requests for the
/// lifetime of the server.
pub struct RequestContext {
    client: OpenWeatherClient,
    store: RecordStore,
    metrics: ApiMetrics,
    registry: Registry,
}

impl RequestContext {
    pub fn new(client: OpenWeatherClient, store: RecordStore, mut registry: Registry) -> Self {
        let metrics = ApiMetrics::new(&mut registry);
        Self {
            client,
            store,
            metrics,
            registry,
        }
    }

    /// Fetch weather for a city and date from the provider and persist it.
    ///
    /// Nothing is written unless both upstream requests succeed.
    async fn collect(&self, city: &str, date: NaiveDate) -> Result<WeatherRecord, ApiError> {
        if self.store.exists(city, date).await? {
            return Err(ApiError::Conflict {
                city: city.to_owned(),
                date,
            });
        }

        let coords = self.upstream(Endpoint::Geocoding, self.client.geocode(city).await)?;
        let summary = self.upstream(Endpoint::DaySummary, self.client.day_summary(&coords, date).await)?;
        let stats = summary.stats();

        let record = WeatherRecord {
            city: city.to_owned(),
            date,
            min_temp: stats.min_temp,
            max_temp: stats.max_temp,
            avg_temp: stats.avg_temp,
            humidity: stats.humidity,
        };

        self.store.insert(&record).await?;
        self.metrics.record_created();
        tracing::info!(message = "collected weather record", city = %city, date = %date);
        Ok(record)
    }

    fn upstream<T>(&self, endpoint: Endpoint, res: Result<T, ClientError>) -> Result<T, ApiError> {
        res.map_err(|e| match e {
            ClientError::UnknownCity(city) => ApiError::NotFound(format!("No data found for city {}", city)),
            e => {
                self.metrics.upstream_error(endpoint);
                ApiError::Upstream(endpoint, e)
            }
        })
    }
}

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Conflict { city: String, date: NaiveDate },
    NotFound(String),
    Upstream(Endpoint, ClientError),
    Storage(StoreError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Conflict { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_, _) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to clients. Server side failures get a generic message
    /// and the underlying error is only logged.
    fn detail(&self) -> String {
        match self {
            Self::Validation(msg) | Self::NotFound(msg) => msg.clone(),
            Self::Conflict { .. } => "Record already exists for this city and date".to_owned(),
            Self::Upstream(Endpoint::Geocoding, _) => "Error fetching city coordinates".to_owned(),
            Self::Upstream(Endpoint::DaySummary, _) => "Error fetching weather data".to_owned(),
            Self::Storage(_) => "Error accessing weather records".to_owned(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "invalid request: {}", msg),
            Self::Conflict { city, date } => write!(f, "record already exists for {} on {}", city, date),
            Self::NotFound(msg) => write!(f, "{}", msg),
            Self::Upstream(_, e) => write!(f, "upstream error: {}", e),
            Self::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for ApiError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Upstream(_, e) => Some(e),
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { city, date } => Self::Conflict { city, date },
            e => Self::Storage(e),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(message = "request failed", error = %self);
        } else {
            tracing::debug!(message = "request rejected", status = %status, error = %self);
        }

        (status, Json(ErrorResponse { detail: self.detail() })).into_response()
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CityDateRequest {
    pub city: String,
    pub date: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CityDateResponse {
    pub city: String,
    pub date: String,
    pub message: String,
}

#[derive(Deserialize, Debug)]
pub struct DateQuery {
    pub date: String,
}

/// Build the router for the data API and the metrics endpoint.
pub fn router(context: Arc<RequestContext>) -> Router {
    let data = Router::new().route("/citydate", get(list_records).post(create_record));

    Router::new()
        .nest("/data", data)
        .route("/metrics", get(text_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn create_record(
    State(context): State<Arc<RequestContext>>,
    payload: Result<Json<CityDateRequest>, JsonRejection>,
) -> Result<Json<CityDateResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::Validation(e.to_string()))?;
    let city = validate_city(&req.city)?;
    let date = parse_date(&req.date)?;

    let record = context.collect(city, date).await?;
    let date = record.date.format("%Y-%m-%d").to_string();

    Ok(Json(CityDateResponse {
        message: format!("Collected data for {} on {}", record.city, date),
        city: record.city,
        date,
    }))
}

async fn list_records(
    State(context): State<Arc<RequestContext>>,
    query: Result<Query<DateQuery>, QueryRejection>,
) -> Result<Json<Vec<WeatherRecord>>, ApiError> {
    let Query(query) = query.map_err(|_| ApiError::Validation(DATE_FORMAT_MSG.to_owned()))?;
    let date = parse_date(&query.date)?;

    let records = context.store.find_by_date(date).await?;
    if records.is_empty() {
        return Err(ApiError::NotFound(format!("No records found for the date {}", query.date)));
    }

    Ok(Json(records))
}

async fn text_metrics(State(context): State<Arc<RequestContext>>) -> Response {
    let mut buf = String::new();

    match encode(&mut buf, &context.registry) {
        Ok(_) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", num_bytes = buf.len());
            ([(CONTENT_TYPE, OPENMETRICS_TEXT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Trim the city name and make sure it's non-empty and within the column limit.
pub fn validate_city(city: &str) -> Result<&str, ApiError> {
    let city = city.trim();
    if city.is_empty() {
        Err(ApiError::Validation("City name must be provided".to_owned()))
    } else if city.chars().count() > MAX_CITY_CHARS {
        Err(ApiError::Validation(format!(
            "City name must be at most {} characters",
            MAX_CITY_CHARS
        )))
    } else {
        Ok(city)
    }
}

/// Parse a date in strict `YYYY-MM-DD` form: zero padded, no sign, no surrounding
/// whitespace, and a real calendar date.
pub fn parse_date(date: &str) -> Result<NaiveDate, ApiError> {
    let bytes = date.as_bytes();
    let shaped = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });

    if !shaped {
        return Err(ApiError::Validation(DATE_FORMAT_MSG.to_owned()));
    }

    NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| ApiError::Validation(DATE_FORMAT_MSG.to_owned()))
}
