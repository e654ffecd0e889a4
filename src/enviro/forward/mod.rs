// Enviro - Environment sensor metrics exporter for Prometheus
//
// Copyright 2022 Nick Pillitteri
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

//! Periodically push the most recent sensor values to external services.

mod core;
mod influx;
mod luftdaten;

pub use crate::forward::core::{http_client, ForwardError, Forwarder, Sink};
pub use crate::forward::influx::{line_protocol, InfluxSink, MEASUREMENT};
pub use crate::forward::luftdaten::{
    climate_submission, particulate_submission, sensor_id, DataValue, LuftdatenSink, Submission, Value,
    LUFTDATEN_ENDPOINT, SOFTWARE_VERSION,
};
