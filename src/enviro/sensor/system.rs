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

use crate::sensor::core::{CpuTemperature, SensorError, SensorErrorKind};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

pub const DEFAULT_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";
pub const DEFAULT_CPUINFO: &str = "/proc/cpuinfo";

/// Read the CPU temperature from a thermal zone exposed by the kernel in
/// millidegrees celsius.
#[derive(Debug, Clone)]
pub struct ThermalZone {
    path: PathBuf,
}

impl ThermalZone {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ThermalZone {
    fn default() -> Self {
        Self::new(DEFAULT_THERMAL_ZONE)
    }
}

impl CpuTemperature for ThermalZone {
    fn cpu_temperature(&mut self) -> Result<f64, SensorError> {
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            SensorError::KindMsgCause(SensorErrorKind::System, "unable to read thermal zone", Box::new(e))
        })?;

        parse_millidegrees(&contents)
    }
}

fn parse_millidegrees(contents: &str) -> Result<f64, SensorError> {
    contents
        .trim()
        .parse::<i64>()
        .map(|v| v as f64 / 1000.0)
        .map_err(|e| SensorError::KindMsgCause(SensorErrorKind::System, "unable to parse thermal zone", Box::new(e)))
}

/// Find the hardware serial number in the contents of `/proc/cpuinfo`: the value
/// of the first line that starts with `Serial`.
pub fn parse_serial_number<R: BufRead>(reader: R) -> io::Result<Option<String>> {
    for line in reader.lines() {
        let line = line?;
        if line.starts_with("Serial") {
            return Ok(line.split(':').nth(1).map(|s| s.trim().to_owned()));
        }
    }

    Ok(None)
}

/// Read the hardware serial number of this Raspberry PI from `path`.
pub fn read_serial_number<P: AsRef<Path>>(path: P) -> io::Result<Option<String>> {
    let file = File::open(path)?;
    parse_serial_number(BufReader::new(file))
}
