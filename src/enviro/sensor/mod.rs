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

mod access;
mod ads1015;
mod bme280;
mod board;
mod bus;
mod compensation;
mod core;
mod ltr559;
mod pms5003;
mod simulated;
mod system;

pub use crate::sensor::access::{Sensor, SensorAccess};
pub use crate::sensor::board::{BoardConfig, EnviroBoard, DEFAULT_SERIAL_PATH};
pub use crate::sensor::bus::{I2cBus, I2cDetectReset, RegisterBus, DEFAULT_I2C_BUS};
pub use crate::sensor::compensation::{Compensator, CPU_WINDOW_SIZE};
pub use crate::sensor::core::{
    BusReset, CpuTemperature, EnviroSensors, GasReading, Humidity, LightReading, ParticulateReading, Pressure,
    SensorError, SensorErrorKind, TemperatureCelsius,
};
pub use crate::sensor::pms5003::ByteSource;
pub use crate::sensor::simulated::{NopReset, SimulatedCpu, SimulatedSensors};
pub use crate::sensor::system::{
    parse_serial_number, read_serial_number, ThermalZone, DEFAULT_CPUINFO, DEFAULT_THERMAL_ZONE,
};

#[cfg(test)]
pub(crate) use crate::sensor::test::{CountingReset, EventRecorder, Failures, MockSensors, SequenceCpuTemperature};
