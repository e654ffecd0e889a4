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

//! Export Pimoroni Enviro and Enviro+ sensor readings as Prometheus metrics.
//!
//! ## Features
//!
//! Enviro reads the sensors of a [Pimoroni Enviro or Enviro+](https://shop.pimoroni.com/products/enviro-plus)
//! board attached to a Raspberry PI and exports the values as Prometheus metrics. Optionally, the
//! values are also posted to InfluxDB and Luftdaten (sensor.community) on their own schedules.
//!
//! The following sensors are read:
//!
//! * BME280 - temperature, pressure, and relative humidity.
//! * LTR559 - light level and proximity.
//! * MICS6814 via an ADS1015 ADC - oxidising, reducing, and NH3 gas resistance (Enviro+ only).
//! * PMS5003 - particulate matter concentrations (Enviro+ only).
//!
//! The following metrics are exported:
//!
//! * `temperature`, `pressure`, `humidity` - Most recent BME280 readings. Temperature may be
//!   compensated for heat from the CPU of the Raspberry PI.
//! * `oxidising`, `reducing`, `NH3` - Most recent gas resistance readings, in Ohms.
//! * `lux`, `proximity` - Most recent LTR559 readings.
//! * `PM1`, `PM25`, `PM10` - Most recent particulate readings, in ug/m3.
//! * `*_measurements` - Histograms of gas and particulate readings.
//! * `enviro_collections_total` - Total number of times the sensors were polled.
//! * `enviro_errors_total` - Total errors by sensor and type while reading sensors.
//! * `enviro_bus_resets_total` - Total number of I2C bus resets after bus errors.
//! * `enviro_pushes_total` - Total pushes to InfluxDB or Luftdaten by result.
//!
//! ## Build
//!
//! `enviro` is meant to be run on a Raspberry PI so you will likely need to cross-compile it.
//!
//! ```text
//! rustup target add armv7-unknown-linux-musleabihf
//! cargo build --release --target armv7-unknown-linux-musleabihf
//! ```
//!
//! ## Run
//!
//! The I2C bus, serial port, and GPIO pins must be enabled and readable by the user running
//! `enviro-exporter`. Metrics are exposed on port `8000` at `/metrics` by default.
//!
//! ```text
//! enviro-exporter --bind 0.0.0.0 --port 8000 --factor 2.25 --influxdb true
//! ```
//!
//! Use `--simulate` to run without any sensor hardware attached.
//!

pub mod config;
pub mod forward;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod poll;
pub mod sensor;
