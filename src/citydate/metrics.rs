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

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct UpstreamLabels {
    endpoint: String,
}

/// Upstream provider endpoints, used as the `endpoint` label on failure counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Geocoding,
    DaySummary,
}

impl Endpoint {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Geocoding => "geocoding",
            Self::DaySummary => "day_summary",
        }
    }
}

#[derive(Debug)]
pub struct ApiMetrics {
    records_created: Counter,
    upstream_errors: Family<UpstreamLabels, Counter>,
}

impl ApiMetrics {
    /// Create a new `ApiMetrics` and register each metric with the provided `Registry`.
    pub fn new(reg: &mut Registry) -> Self {
        let records_created = Counter::default();
        let upstream_errors = Family::<UpstreamLabels, Counter>::default();

        reg.register(
            "citydate_records_created",
            "Weather records collected and persisted",
            records_created.clone(),
        );
        reg.register(
            "citydate_upstream_errors",
            "Failed requests to the weather provider",
            upstream_errors.clone(),
        );

        Self {
            records_created,
            upstream_errors,
        }
    }

    pub fn record_created(&self) {
        self.records_created.inc();
    }

    pub fn upstream_error(&self, endpoint: Endpoint) {
        self.upstream_errors
            .get_or_create(&UpstreamLabels {
                endpoint: endpoint.as_str().to_owned(),
            })
            .inc();
    }
}
