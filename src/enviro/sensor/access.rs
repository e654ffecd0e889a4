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

use crate::metrics::AccessMetrics;
use crate::sensor::core::{
    BusReset, EnviroSensors, GasReading, Humidity, LightReading, ParticulateReading, Pressure, SensorError,
    SensorErrorKind, TemperatureCelsius,
};

/// Each group of measurements read from the board, used for logging and labels.
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy)]
pub enum Sensor {
    Temperature,
    Pressure,
    Humidity,
    Gas,
    Light,
    Particulates,
}

impl Sensor {
    pub fn as_label(&self) -> &'static str {
        match self {
            Sensor::Temperature => "temperature",
            Sensor::Pressure => "pressure",
            Sensor::Humidity => "humidity",
            Sensor::Gas => "gas",
            Sensor::Light => "light",
            Sensor::Particulates => "particulates",
        }
    }
}

/// Read sensors, handling failures by logging them and (for bus failures) resetting
/// the bus. A failed read returns `None` and is not retried: the next poll will
/// try again.
///
/// The particulate sensor needs time to warm up and regularly times out while
/// doing so. Timeouts and corrupt frames from it are expected and don't cause a
/// bus reset.
pub struct SensorAccess<S, R> {
    sensors: S,
    reset: R,
    metrics: Option<AccessMetrics>,
}

impl<S, R> SensorAccess<S, R>
where
    S: EnviroSensors,
    R: BusReset,
{
    pub fn new(sensors: S, reset: R) -> Self {
        Self {
            sensors,
            reset,
            metrics: None,
        }
    }

    /// Count failed reads and bus resets using the provided metrics.
    pub fn with_metrics(mut self, metrics: AccessMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn temperature(&mut self) -> Option<TemperatureCelsius> {
        let res = self.sensors.temperature();
        self.handle(Sensor::Temperature, res)
    }

    pub fn pressure(&mut self) -> Option<Pressure> {
        let res = self.sensors.pressure();
        self.handle(Sensor::Pressure, res)
    }

    pub fn humidity(&mut self) -> Option<Humidity> {
        let res = self.sensors.humidity();
        self.handle(Sensor::Humidity, res)
    }

    pub fn gas(&mut self) -> Option<GasReading> {
        let res = self.sensors.gas();
        self.handle(Sensor::Gas, res)
    }

    pub fn light(&mut self) -> Option<LightReading> {
        let res = self.sensors.light();
        self.handle(Sensor::Light, res)
    }

    pub fn particulates(&mut self) -> Option<ParticulateReading> {
        let res = self.sensors.particulates();
        self.handle(Sensor::Particulates, res)
    }

    fn handle<T>(&mut self, sensor: Sensor, res: Result<T, SensorError>) -> Option<T> {
        let e = match res {
            Ok(v) => return Some(v),
            Err(e) => e,
        };

        if let Some(m) = &self.metrics {
            m.failed(sensor, e.kind());
        }

        match e.kind() {
            SensorErrorKind::Bus => {
                tracing::error!(
                    message = "could not get readings, resetting i2c",
                    sensor = sensor.as_label(),
                    error = %e,
                );

                self.reset.reset();
                if let Some(m) = &self.metrics {
                    m.reset();
                }
            }
            SensorErrorKind::ReadTimeout | SensorErrorKind::Checksum if sensor == Sensor::Particulates => {
                tracing::warn!(message = "failed to read PMS5003", error = %e);
            }
            _ => {
                tracing::error!(message = "could not get readings", sensor = sensor.as_label(), error = %e);
            }
        }

        None
    }
}
