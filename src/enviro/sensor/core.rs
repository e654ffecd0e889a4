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

use std::error::Error;
use std::fmt::{self, Formatter};

macro_rules! unit {
    ($(#[$meta:meta])* $name:ident, $suffix:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq)]
        #[repr(transparent)]
        pub struct $name(f64);

        impl From<$name> for f64 {
            fn from(v: $name) -> Self {
                v.0
            }
        }

        impl From<f64> for $name {
            fn from(v: f64) -> Self {
                Self(v)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", self.0, $suffix)
            }
        }
    };
}

unit!(
    /// Temperature, in degrees celsius
    TemperatureCelsius,
    "c"
);

unit!(
    /// Air pressure, in hectopascals
    Pressure,
    "hPa"
);

unit!(
    /// Relative humidity (from 0 to 100)
    Humidity,
    "%"
);

/// Resistance of the three MICS6814 gas sensing elements, in Ohms.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GasReading {
    pub oxidising: f64,
    pub reducing: f64,
    pub nh3: f64,
}

impl fmt::Display for GasReading {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "oxidising: {:.2} Ohms, reducing: {:.2} Ohms, nh3: {:.2} Ohms",
            self.oxidising, self.reducing, self.nh3
        )
    }
}

/// Ambient light level and raw proximity count.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LightReading {
    pub lux: f64,
    pub proximity: f64,
}

impl fmt::Display for LightReading {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "lux: {:.2}, proximity: {}", self.lux, self.proximity)
    }
}

/// A single frame of data from the PMS5003 particulate sensor.
///
/// Mass concentrations are in micrograms per cubic metre. "Standard" values are
/// calibrated against standard particles (CF=1), "atmospheric" values are for
/// the atmospheric environment. Counts are the number of particles beyond a given
/// diameter in 0.1L of air.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct ParticulateReading {
    pub pm1_standard: u16,
    pub pm25_standard: u16,
    pub pm10_standard: u16,
    pub pm1_atmospheric: u16,
    pub pm25_atmospheric: u16,
    pub pm10_atmospheric: u16,
    pub counts: [u16; 6],
}

impl ParticulateReading {
    /// Standard mass concentration for particles smaller than `size` microns, or
    /// `None` if `size` isn't one of 1.0, 2.5, or 10.
    pub fn pm_ug_per_m3(&self, size: f64) -> Option<f64> {
        if size == 1.0 {
            Some(self.pm1_standard.into())
        } else if size == 2.5 {
            Some(self.pm25_standard.into())
        } else if size == 10.0 {
            Some(self.pm10_standard.into())
        } else {
            None
        }
    }

    pub fn pm1(&self) -> f64 {
        self.pm1_standard.into()
    }

    pub fn pm25(&self) -> f64 {
        self.pm25_standard.into()
    }

    pub fn pm10(&self) -> f64 {
        self.pm10_standard.into()
    }
}

impl fmt::Display for ParticulateReading {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PM1.0: {} ug/m3, PM2.5: {} ug/m3, PM10: {} ug/m3",
            self.pm1_standard, self.pm25_standard, self.pm10_standard
        )
    }
}

/// Potential kinds of errors that can be encountered reading from the sensors
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy)]
pub enum SensorErrorKind {
    Initialization,
    Bus,
    ReadTimeout,
    Checksum,
    /// Reading a file exposed by the kernel, such as a thermal zone
    System,
}

impl SensorErrorKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            SensorErrorKind::Initialization => "initialization",
            SensorErrorKind::Bus => "bus",
            SensorErrorKind::ReadTimeout => "timeout",
            SensorErrorKind::Checksum => "checksum",
            SensorErrorKind::System => "system",
        }
    }
}

/// Error initializing or reading one of the sensors on the board
#[derive(Debug)]
pub enum SensorError {
    CheckSum(u16, u16),
    KindMsg(SensorErrorKind, &'static str),
    KindMsgCause(SensorErrorKind, &'static str, Box<dyn Error + Send + Sync>),
}

impl SensorError {
    pub fn kind(&self) -> SensorErrorKind {
        match self {
            SensorError::CheckSum(_, _) => SensorErrorKind::Checksum,
            SensorError::KindMsg(kind, _) => *kind,
            SensorError::KindMsgCause(kind, _, _) => *kind,
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::CheckSum(expected, got) => {
                write!(f, "checksum error: expected {}, got {}", expected, got)
            }
            SensorError::KindMsg(_, msg) => f.write_str(msg),
            SensorError::KindMsgCause(_, msg, ref e) => write!(f, "{}: {}", msg, e),
        }
    }
}

impl Error for SensorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SensorError::KindMsgCause(_, _, ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Every measurement the board can make.
///
/// The real implementation talks to devices over I2C and a serial line, the
/// simulated and test implementations don't touch any hardware.
pub trait EnviroSensors {
    fn temperature(&mut self) -> Result<TemperatureCelsius, SensorError>;
    fn pressure(&mut self) -> Result<Pressure, SensorError>;
    fn humidity(&mut self) -> Result<Humidity, SensorError>;
    fn gas(&mut self) -> Result<GasReading, SensorError>;
    fn light(&mut self) -> Result<LightReading, SensorError>;
    fn particulates(&mut self) -> Result<ParticulateReading, SensorError>;
}

/// Source of the current CPU temperature, in degrees celsius.
pub trait CpuTemperature {
    fn cpu_temperature(&mut self) -> Result<f64, SensorError>;
}

/// Best-effort recovery of the bus after an I/O failure.
pub trait BusReset {
    fn reset(&mut self);
}

#[cfg(test)]
mod test {
    use super::{ParticulateReading, SensorError, SensorErrorKind, TemperatureCelsius};

    #[test]
    fn test_pm_ug_per_m3_sizes() {
        let reading = ParticulateReading {
            pm1_standard: 3,
            pm25_standard: 7,
            pm10_standard: 12,
            ..Default::default()
        };

        assert_eq!(Some(3.0), reading.pm_ug_per_m3(1.0));
        assert_eq!(Some(7.0), reading.pm_ug_per_m3(2.5));
        assert_eq!(Some(12.0), reading.pm_ug_per_m3(10.0));
        assert_eq!(None, reading.pm_ug_per_m3(5.0));
    }

    #[test]
    fn test_sensor_error_kind() {
        assert_eq!(SensorErrorKind::Checksum, SensorError::CheckSum(1, 2).kind());
        assert_eq!(
            SensorErrorKind::ReadTimeout,
            SensorError::KindMsg(SensorErrorKind::ReadTimeout, "no frame").kind()
        );
        assert_eq!("bus", SensorErrorKind::Bus.as_label());
    }

    #[test]
    fn test_unit_display() {
        assert_eq!("21.5c", TemperatureCelsius::from(21.5).to_string());
    }
}
