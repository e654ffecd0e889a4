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

use crate::sensor::core::{BusReset, SensorError, SensorErrorKind};
use rppal::i2c::I2c;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

/// I2C bus the Enviro and Enviro+ boards are attached to on a Raspberry PI.
pub const DEFAULT_I2C_BUS: u8 = 1;

const RESET_SETTLE_TIME: Duration = Duration::from_secs(2);

/// Abstraction around register reads and writes of devices on a shared I2C bus
/// to allow for easier testing.
///
/// Every device on the board is addressed per-transaction since they all share
/// a single bus handle.
pub trait RegisterBus {
    fn read_registers(&mut self, address: u16, register: u8, buf: &mut [u8]) -> Result<(), SensorError>;
    fn write_register(&mut self, address: u16, register: u8, data: &[u8]) -> Result<(), SensorError>;

    fn read_register(&mut self, address: u16, register: u8) -> Result<u8, SensorError> {
        let mut buf = [0u8; 1];
        self.read_registers(address, register, &mut buf)?;
        Ok(buf[0])
    }
}

/// `RegisterBus` implementation backed by `rppal::i2c::I2c`.
#[derive(Debug)]
pub struct I2cBus {
    i2c: I2c,
    address: Option<u16>,
}

impl I2cBus {
    pub fn open(bus: u8) -> Result<Self, SensorError> {
        let i2c = I2c::with_bus(bus).map_err(|e| {
            SensorError::KindMsgCause(SensorErrorKind::Initialization, "unable to open i2c bus", Box::new(e))
        })?;

        Ok(Self { i2c, address: None })
    }

    fn select(&mut self, address: u16) -> Result<(), SensorError> {
        if self.address != Some(address) {
            self.i2c.set_slave_address(address).map_err(|e| {
                SensorError::KindMsgCause(SensorErrorKind::Bus, "unable to set i2c device address", Box::new(e))
            })?;
            self.address = Some(address);
        }

        Ok(())
    }
}

impl RegisterBus for I2cBus {
    fn read_registers(&mut self, address: u16, register: u8, buf: &mut [u8]) -> Result<(), SensorError> {
        self.select(address)?;
        self.i2c
            .write_read(&[register], buf)
            .map_err(|e| SensorError::KindMsgCause(SensorErrorKind::Bus, "unable to read i2c register", Box::new(e)))
    }

    fn write_register(&mut self, address: u16, register: u8, data: &[u8]) -> Result<(), SensorError> {
        self.select(address)?;
        let mut buf = Vec::with_capacity(data.len() + 1);
        buf.push(register);
        buf.extend_from_slice(data);

        self.i2c
            .write(&buf)
            .map(|_| ())
            .map_err(|e| SensorError::KindMsgCause(SensorErrorKind::Bus, "unable to write i2c register", Box::new(e)))
    }
}

/// Reset the I2C bus by scanning every address on it with `i2cdetect` and then
/// giving devices a couple seconds to settle.
///
/// Sometimes the sensors stop responding and a scan of the bus is enough to
/// get them working again.
#[derive(Debug, Clone)]
pub struct I2cDetectReset {
    bus: u8,
    settle: Duration,
}

impl I2cDetectReset {
    pub fn new(bus: u8) -> Self {
        Self {
            bus,
            settle: RESET_SETTLE_TIME,
        }
    }
}

impl Default for I2cDetectReset {
    fn default() -> Self {
        Self::new(DEFAULT_I2C_BUS)
    }
}

impl BusReset for I2cDetectReset {
    fn reset(&mut self) {
        let res = Command::new("i2cdetect")
            .arg("-y")
            .arg(self.bus.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match res {
            Ok(status) => tracing::debug!(message = "scanned i2c bus", bus = self.bus, status = %status),
            Err(e) => tracing::warn!(message = "unable to run i2cdetect", bus = self.bus, error = %e),
        }

        thread::sleep(self.settle);
    }
}
