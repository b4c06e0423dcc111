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

//! HTTP API for collecting daily weather statistics per city and date
//!
//! ## Features
//!
//! `citydate` looks up a city with the [OpenWeather geocoding API], fetches the
//! [day summary] for a date at that location, and stores the result in a local SQLite
//! database. At most one record is kept for each city and date. The following values
//! are stored for each record.
//!
//! * `min_temp` - Minimum temperature for the day, in degrees celsius.
//! * `max_temp` - Maximum temperature for the day, in degrees celsius.
//! * `avg_temp` - Mean of the morning, afternoon, evening, and night temperatures, in degrees celsius.
//! * `humidity` - Afternoon relative humidity (0-100).
//!
//! [OpenWeather geocoding API]: https://openweathermap.org/api/geocoding-api
//! [day summary]: https://openweathermap.org/api/one-call-3#history_daily_aggregation
//!
//! ## Build
//!
//! `citydate` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! git clone git@github.com:56quarters/citydate.git && cd citydate
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! An OpenWeather API key with access to the One Call 3.0 API is required. It can be
//! passed with `--api-key` or the `API_KEY` environment variable. Records are stored in
//! `sqlite.db` in the working directory unless `--database-url` (or `DATABASE_URL`)
//! says otherwise. The schema is created on startup.
//!
//! ```text
//! API_KEY=... ./citydate --bind 127.0.0.1:8000
//! ```
//!
//! ### Collecting a record
//!
//! ```text
//! curl -sS -X POST -H 'Content-Type: application/json' \
//!     -d '{"city": "New York", "date": "2024-08-06"}' \
//!     http://localhost:8000/data/citydate
//! ```
//!
//! Responds with `{"city": "New York", "date": "2024-08-06", "message": "Collected data for New York on 2024-08-06"}`.
//! Requesting the same city and date again results in a `400` since records are never
//! overwritten. A city unknown to OpenWeather results in a `404` and failures talking to
//! OpenWeather result in a `500`.
//!
//! ### Listing records
//!
//! ```text
//! curl -sS 'http://localhost:8000/data/citydate?date=2024-08-06'
//! ```
//!
//! Responds with every record for the date or a `404` if there are none.
//!
//! ### Prometheus
//!
//! Counts of collected records and failed OpenWeather requests are exposed at `/metrics`.
//!

pub mod client;
pub mod http;
pub mod metrics;
pub mod store;
