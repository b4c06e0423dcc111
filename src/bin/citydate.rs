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

use citydate::client::OpenWeatherClient;
use citydate::http::RequestContext;
use citydate::store::RecordStore;
use clap::Parser;
use prometheus_client::registry::Registry;
use reqwest::{Client, Url};
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8000);
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_DATABASE_URL: &str = "sqlite://sqlite.db";
const DEFAULT_GEOCODING_URL: &str = "https://api.openweathermap.org/geo/1.0/direct";
const DEFAULT_DAY_SUMMARY_URL: &str = "https://api.openweathermap.org/data/3.0/onecall/day_summary";

#[derive(Debug, Parser)]
#[clap(name = "citydate", version = clap::crate_version!())]
struct CityDateApplication {
    /// OpenWeather API key, used for both geocoding and weather requests
    #[clap(long, env = "API_KEY", hide_env_values = true)]
    api_key: String,

    /// SQLite connection string for the weather record database. The database is
    /// created if it does not exist.
    #[clap(long, env = "DATABASE_URL", default_value_t = DEFAULT_DATABASE_URL.into())]
    database_url: String,

    /// Maximum number of open database connections
    #[clap(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: u32,

    /// URL of the OpenWeather direct geocoding API
    #[clap(long, env = "GEOCODING_URL", default_value = DEFAULT_GEOCODING_URL)]
    geocoding_url: Url,

    /// URL of the OpenWeather One Call day summary API
    #[clap(long, env = "DAY_SUMMARY_URL", default_value = DEFAULT_DAY_SUMMARY_URL)]
    day_summary_url: Url,

    /// Timeout for each request to the OpenWeather API, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Address to bind to.
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = CityDateApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let store = RecordStore::connect(&opts.database_url, opts.max_connections)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(message = "unable to open database", database_url = %opts.database_url, error = %e);
            process::exit(1)
        });

    // Create or update the schema before accepting any requests that depend on it.
    if let Err(e) = store.migrate().await {
        tracing::error!(message = "unable to migrate database", database_url = %opts.database_url, error = %e);
        process::exit(1)
    }

    tracing::debug!(message = "database ready", database_url = %opts.database_url);

    let client = OpenWeatherClient::new(
        http_client,
        &opts.api_key,
        opts.geocoding_url.clone(),
        opts.day_summary_url.clone(),
    );
    let context = Arc::new(RequestContext::new(client, store, Registry::default()));
    let app = citydate::http::router(context);

    let server = axum::Server::try_bind(&opts.bind).unwrap_or_else(|e| {
        tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
        process::exit(1)
    });

    tracing::info!(
        message = "server started",
        address = %opts.bind,
        geocoding_url = %opts.geocoding_url,
        day_summary_url = %opts.day_summary_url,
    );

    server
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
