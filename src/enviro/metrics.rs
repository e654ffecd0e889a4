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

use crate::sensor::{GasReading, Humidity, LightReading, ParticulateReading, Pressure, Sensor, SensorErrorKind, TemperatureCelsius};
use prometheus::core::Collector;
use prometheus::{
    linear_buckets, Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use serde::Serialize;
use std::error::Error;
use std::fmt;

fn register<C: Collector + Clone + 'static>(reg: &Registry, c: C) -> prometheus::Result<C> {
    reg.register(Box::new(c.clone()))?;
    Ok(c)
}

fn gauge(reg: &Registry, name: &str, help: &str) -> prometheus::Result<Gauge> {
    register(reg, Gauge::new(name, help)?)
}

fn histogram(reg: &Registry, name: &str, help: &str, buckets: Vec<f64>) -> prometheus::Result<Histogram> {
    register(reg, Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets))?)
}

fn oxidising_buckets() -> prometheus::Result<Vec<f64>> {
    let mut buckets = vec![0.0];
    buckets.extend(linear_buckets(10000.0, 5000.0, 17)?);
    buckets.push(100000.0);
    Ok(buckets)
}

fn reducing_buckets() -> prometheus::Result<Vec<f64>> {
    linear_buckets(0.0, 100000.0, 16)
}

fn nh3_buckets() -> prometheus::Result<Vec<f64>> {
    let mut buckets = vec![0.0];
    buckets.extend(linear_buckets(10000.0, 100000.0, 20)?);
    buckets.push(2000000.0);
    Ok(buckets)
}

fn particulate_buckets() -> prometheus::Result<Vec<f64>> {
    linear_buckets(0.0, 5.0, 21)
}

/// Counters for failed sensor reads and the resulting bus resets.
#[derive(Debug, Clone)]
pub struct AccessMetrics {
    errors: IntCounterVec,
    resets: IntCounter,
}

impl AccessMetrics {
    pub fn new(reg: &Registry) -> prometheus::Result<Self> {
        let errors = register(
            reg,
            IntCounterVec::new(
                Opts::new("enviro_errors_total", "Number of failed sensor reads by sensor and type"),
                &["sensor", "kind"],
            )?,
        )?;
        let resets = register(
            reg,
            IntCounter::new("enviro_bus_resets_total", "Number of i2c bus resets after read failures")?,
        )?;

        Ok(Self { errors, resets })
    }

    pub(crate) fn failed(&self, sensor: Sensor, kind: SensorErrorKind) {
        self.errors
            .with_label_values(&[sensor.as_label(), kind.as_label()])
            .inc();
    }

    pub(crate) fn reset(&self) {
        self.resets.inc();
    }

    pub fn failures(&self, sensor: Sensor, kind: SensorErrorKind) -> u64 {
        self.errors
            .with_label_values(&[sensor.as_label(), kind.as_label()])
            .get()
    }

    pub fn resets(&self) -> u64 {
        self.resets.get()
    }
}

/// Current value of every gauge, in a fixed order.
///
/// Values of gauges that have never been set are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub oxidising: f64,
    pub reducing: f64,
    pub nh3: f64,
    pub lux: f64,
    pub proximity: f64,
    pub pm1: f64,
    pub pm25: f64,
    pub pm10: f64,
}

impl Snapshot {
    /// Flat field name to value mapping of the snapshot.
    pub fn fields(&self) -> [(&'static str, f64); 11] {
        [
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("pressure", self.pressure),
            ("oxidising", self.oxidising),
            ("reducing", self.reducing),
            ("nh3", self.nh3),
            ("lux", self.lux),
            ("proximity", self.proximity),
            ("pm1", self.pm1),
            ("pm25", self.pm25),
            ("pm10", self.pm10),
        ]
    }
}

/// Collection of Prometheus metrics updated based on Enviro and Enviro+ sensor
/// readings.
///
/// Every measurement is emitted as a gauge holding the most recent value. Gas and
/// particulate measurements are additionally observed by histograms to track their
/// distribution over time. Metric handles are cheap to clone and all clones refer
/// to the same underlying values.
#[derive(Debug, Clone)]
pub struct EnviroMetrics {
    temperature: Gauge,
    pressure: Gauge,
    humidity: Gauge,
    oxidising: Gauge,
    reducing: Gauge,
    nh3: Gauge,
    lux: Gauge,
    proximity: Gauge,
    pm1: Gauge,
    pm25: Gauge,
    pm10: Gauge,
    oxidising_hist: Histogram,
    reducing_hist: Histogram,
    nh3_hist: Histogram,
    pm1_hist: Histogram,
    pm25_hist: Histogram,
    pm10_hist: Histogram,
    collections: IntCounter,
    pushes: IntCounterVec,
    access: AccessMetrics,
}

impl EnviroMetrics {
    pub fn new(reg: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            temperature: gauge(reg, "temperature", "Temperature measured (*C)")?,
            pressure: gauge(reg, "pressure", "Pressure measured (hPa)")?,
            humidity: gauge(reg, "humidity", "Relative humidity measured (%)")?,
            oxidising: gauge(
                reg,
                "oxidising",
                "Mostly nitrogen dioxide but could include NO and Hydrogen (Ohms)",
            )?,
            reducing: gauge(
                reg,
                "reducing",
                "Mostly carbon monoxide but could include H2S, Ammonia, Ethanol, Hydrogen, Methane, Propane, Iso-butane (Ohms)",
            )?,
            nh3: gauge(
                reg,
                "NH3",
                "mostly Ammonia but could also include Hydrogen, Ethanol, Propane, Iso-butane (Ohms)",
            )?,
            lux: gauge(reg, "lux", "current ambient light level (lux)")?,
            proximity: gauge(
                reg,
                "proximity",
                "proximity, with larger numbers being closer proximity and vice versa",
            )?,
            pm1: gauge(
                reg,
                "PM1",
                "Particulate Matter of diameter less than 1 micron. Measured in micrograms per cubic metre (ug/m3)",
            )?,
            pm25: gauge(
                reg,
                "PM25",
                "Particulate Matter of diameter less than 2.5 microns. Measured in micrograms per cubic metre (ug/m3)",
            )?,
            pm10: gauge(
                reg,
                "PM10",
                "Particulate Matter of diameter less than 10 microns. Measured in micrograms per cubic metre (ug/m3)",
            )?,
            oxidising_hist: histogram(
                reg,
                "oxidising_measurements",
                "Histogram of oxidising measurements",
                oxidising_buckets()?,
            )?,
            reducing_hist: histogram(
                reg,
                "reducing_measurements",
                "Histogram of reducing measurements",
                reducing_buckets()?,
            )?,
            nh3_hist: histogram(
                reg,
                "nh3_measurements",
                "Histogram of nh3 measurements",
                nh3_buckets()?,
            )?,
            pm1_hist: histogram(
                reg,
                "pm1_measurements",
                "Histogram of Particulate Matter of diameter less than 1 micron measurements",
                particulate_buckets()?,
            )?,
            pm25_hist: histogram(
                reg,
                "pm25_measurements",
                "Histogram of Particulate Matter of diameter less than 2.5 micron measurements",
                particulate_buckets()?,
            )?,
            pm10_hist: histogram(
                reg,
                "pm10_measurements",
                "Histogram of Particulate Matter of diameter less than 10 micron measurements",
                particulate_buckets()?,
            )?,
            collections: register(
                reg,
                IntCounter::new("enviro_collections_total", "Number of times all sensors were polled")?,
            )?,
            pushes: register(
                reg,
                IntCounterVec::new(
                    Opts::new("enviro_pushes_total", "Number of pushes to external sinks by result"),
                    &["sink", "result"],
                )?,
            )?,
            access: AccessMetrics::new(reg)?,
        })
    }

    /// Metrics for failed reads and bus resets, shared with these metrics.
    pub fn access(&self) -> AccessMetrics {
        self.access.clone()
    }

    pub fn collection(&self) {
        self.collections.inc();
    }

    pub fn collections(&self) -> u64 {
        self.collections.get()
    }

    pub fn pushed(&self, sink: &str, ok: bool) {
        let result = if ok { "success" } else { "failure" };
        self.pushes.with_label_values(&[sink, result]).inc();
    }

    pub fn pushes(&self, sink: &str, ok: bool) -> u64 {
        let result = if ok { "success" } else { "failure" };
        self.pushes.with_label_values(&[sink, result]).get()
    }

    pub fn set_temperature(&self, v: TemperatureCelsius) {
        self.temperature.set(v.into());
    }

    pub fn set_pressure(&self, v: Pressure) {
        self.pressure.set(v.into());
    }

    pub fn set_humidity(&self, v: Humidity) {
        self.humidity.set(v.into());
    }

    pub fn set_gas(&self, v: &GasReading) {
        self.oxidising.set(v.oxidising);
        self.oxidising_hist.observe(v.oxidising);

        self.reducing.set(v.reducing);
        self.reducing_hist.observe(v.reducing);

        self.nh3.set(v.nh3);
        self.nh3_hist.observe(v.nh3);
    }

    pub fn set_light(&self, v: &LightReading) {
        self.lux.set(v.lux);
        self.proximity.set(v.proximity);
    }

    /// Set particulate gauges to the cumulative mass of each size (everything smaller
    /// than the size) while the histograms observe the mass of only the band between
    /// a size and the next smallest one.
    pub fn set_particulates(&self, v: &ParticulateReading) {
        self.pm1.set(v.pm1());
        self.pm25.set(v.pm25());
        self.pm10.set(v.pm10());

        self.pm1_hist.observe(v.pm1());
        self.pm25_hist.observe(v.pm25() - v.pm1());
        self.pm10_hist.observe(v.pm10() - v.pm25());
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            temperature: self.temperature.get(),
            humidity: self.humidity.get(),
            pressure: self.pressure.get(),
            oxidising: self.oxidising.get(),
            reducing: self.reducing.get(),
            nh3: self.nh3.get(),
            lux: self.lux.get(),
            proximity: self.proximity.get(),
            pm1: self.pm1.get(),
            pm25: self.pm25.get(),
            pm10: self.pm10.get(),
        }
    }
}

/// Error exposing Prometheus metrics in the text exposition format.
#[derive(Debug)]
pub enum ExpositionError {
    Encoding(&'static str, Box<dyn Error + Send + Sync + 'static>),
}

impl fmt::Display for ExpositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpositionError::Encoding(msg, ref e) => write!(f, "{}: {}", msg, e),
        }
    }
}

impl Error for ExpositionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExpositionError::Encoding(_, ref e) => Some(e.as_ref()),
        }
    }
}

/// Wrapper that exposes metrics from a Prometheus registry in the text exposition format.
#[derive(Debug)]
pub struct MetricsExposition {
    registry: Registry,
}

impl MetricsExposition {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Gather all metrics from the registry and encode them in the Prometheus text
    /// exposition format, returning an error if they couldn't be encoded for some reason.
    pub fn encoded_text(&self) -> Result<Vec<u8>, ExpositionError> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();

        tracing::debug!(
            message = "encoding metric families to text exposition format",
            num_metrics = metric_families.len(),
        );

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| ExpositionError::Encoding("unable to encode Prometheus metrics", Box::new(e)))
            .map(|_| buffer)
    }
}
