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
use serde::Serialize;
use sqlx::migrate::MigrateError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::error;
use std::fmt;
use std::str::FromStr;

#[derive(Debug)]
pub enum StoreError {
    Database(sqlx::Error),
    Migration(MigrateError),
    Conflict { city: String, date: NaiveDate },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(e) => write!(f, "database error: {}", e),
            Self::Migration(e) => write!(f, "migration error: {}", e),
            Self::Conflict { city, date } => write!(f, "record already exists for {} on {}", city, date),
        }
    }
}

impl error::Error for StoreError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Database(e) => Some(e),
            Self::Migration(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e)
    }
}

/// Weather statistics collected for a single city on a single day.
#[derive(Serialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct WeatherRecord {
    pub city: String,
    pub date: NaiveDate,
    pub min_temp: f64,
    pub max_temp: f64,
    pub avg_temp: f64,
    pub humidity: f64,
}

/// SQLite backed storage for weather records, keyed by city and date.
///
/// Connections are checked out of the pool for each query and returned when the
/// query completes, successfully or not.
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        RecordStore { pool }
    }

    /// Open a pool for the given SQLite connection string, creating the database
    /// file if it doesn't exist yet. The schema is not created, see `migrate`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        Ok(Self::new(pool))
    }

    /// Apply any pending schema migrations. Must be run before serving requests.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(StoreError::Migration)
    }

    pub async fn exists(&self, city: &str, date: NaiveDate) -> Result<bool, StoreError> {
        let found = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM city_dates WHERE city = ? AND date = ?)")
            .bind(city)
            .bind(date)
            .fetch_one(&self.pool)
            .await?;

        Ok(found)
    }

    /// Persist a new record, failing with `StoreError::Conflict` if one already exists
    /// for the same city and date. Existing records are never overwritten.
    pub async fn insert(&self, record: &WeatherRecord) -> Result<(), StoreError> {
        let res = sqlx::query(
            "INSERT INTO city_dates (city, date, min_temp, max_temp, avg_temp, humidity) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (city, date) DO NOTHING",
        )
        .bind(&record.city)
        .bind(record.date)
        .bind(record.min_temp)
        .bind(record.max_temp)
        .bind(record.avg_temp)
        .bind(record.humidity)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            Err(StoreError::Conflict {
                city: record.city.clone(),
                date: record.date,
            })
        } else {
            Ok(())
        }
    }

    /// All records for the given date, in the order they were inserted.
    pub async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<WeatherRecord>, StoreError> {
        let records = sqlx::query_as::<_, WeatherRecord>(
            "SELECT city, date, min_temp, max_temp, avg_temp, humidity \
             FROM city_dates WHERE date = ? ORDER BY rowid",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
