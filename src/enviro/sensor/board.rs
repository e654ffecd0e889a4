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

use crate::sensor::ads1015::{Ads1015, ADS1015_ADDRESS};
use crate::sensor::bme280::{Bme280, BME280_ADDRESS};
use crate::sensor::bus::{I2cBus, DEFAULT_I2C_BUS};
use crate::sensor::core::{
    EnviroSensors, GasReading, Humidity, LightReading, ParticulateReading, Pressure, SensorError, SensorErrorKind,
    TemperatureCelsius,
};
use crate::sensor::ltr559::{Ltr559, LTR559_ADDRESS};
use crate::sensor::pms5003::{Pms5003, DEFAULT_READ_TIMEOUT};
use rppal::gpio::{Gpio, OutputPin};
use rppal::uart::{Parity, Uart};
use std::fmt::{self, Debug, Formatter};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

pub const DEFAULT_SERIAL_PATH: &str = "/dev/ttyAMA0";

const GAS_HEATER_PIN: u8 = 24;
const PMS5003_ENABLE_PIN: u8 = 22;
const PMS5003_RESET_PIN: u8 = 27;
const PMS5003_BAUD_RATE: u32 = 9600;

/// Which devices to expect on the board.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub i2c_bus: u8,
    /// The Enviro+ has gas and particulate sensors, the plain Enviro doesn't.
    pub plus: bool,
    pub serial_path: PathBuf,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            i2c_bus: DEFAULT_I2C_BUS,
            plus: true,
            serial_path: PathBuf::from(DEFAULT_SERIAL_PATH),
        }
    }
}

fn init_error<E>(msg: &'static str) -> impl FnOnce(E) -> SensorError
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |e| SensorError::KindMsgCause(SensorErrorKind::Initialization, msg, Box::new(e))
}

/// Devices only present on the Enviro+.
struct PlusDevices {
    gas: Ads1015,
    pms: Pms5003<Uart>,
    // Held so the pins aren't reset when dropped
    _heater: OutputPin,
    _enable: OutputPin,
    _reset: OutputPin,
}

impl PlusDevices {
    fn open(config: &BoardConfig) -> Result<Self, SensorError> {
        let gpio = Gpio::new().map_err(init_error("unable to create GPIO controller"))?;

        let mut heater = gpio
            .get(GAS_HEATER_PIN)
            .map_err(init_error("unable to acquire gas heater pin"))?
            .into_output();
        heater.set_high();

        let mut enable = gpio
            .get(PMS5003_ENABLE_PIN)
            .map_err(init_error("unable to acquire PMS5003 enable pin"))?
            .into_output();
        let mut reset = gpio
            .get(PMS5003_RESET_PIN)
            .map_err(init_error("unable to acquire PMS5003 reset pin"))?
            .into_output();

        enable.set_high();
        reset.set_high();
        // Pulse reset low to get the sensor into a known state
        reset.set_low();
        thread::sleep(Duration::from_millis(100));
        reset.set_high();

        let mut uart = Uart::with_path(&config.serial_path, PMS5003_BAUD_RATE, Parity::None, 8, 1)
            .map_err(init_error("unable to open PMS5003 serial port"))?;
        uart.set_read_mode(0, Duration::from_millis(100))
            .map_err(init_error("unable to set PMS5003 serial read mode"))?;

        Ok(Self {
            gas: Ads1015::new(ADS1015_ADDRESS),
            pms: Pms5003::new(uart, DEFAULT_READ_TIMEOUT),
            _heater: heater,
            _enable: enable,
            _reset: reset,
        })
    }
}

/// Sensors of a Pimoroni Enviro or Enviro+ board attached to a Raspberry PI.
///
/// All I2C devices share one bus handle. Callers are expected to serialize
/// access to the board, it is not meant to be read from multiple threads.
pub struct EnviroBoard {
    bus: I2cBus,
    bme280: Bme280,
    ltr559: Ltr559,
    plus: Option<PlusDevices>,
}

impl EnviroBoard {
    pub fn open(config: &BoardConfig) -> Result<Self, SensorError> {
        let mut bus = I2cBus::open(config.i2c_bus)?;
        let bme280 = Bme280::init(&mut bus, BME280_ADDRESS)?;
        let ltr559 = Ltr559::init(&mut bus, LTR559_ADDRESS)?;
        let plus = if config.plus {
            Some(PlusDevices::open(config)?)
        } else {
            None
        };

        tracing::info!(
            message = "opened sensors",
            i2c_bus = config.i2c_bus,
            plus = config.plus,
            serial_path = %config.serial_path.display(),
        );

        Ok(Self {
            bus,
            bme280,
            ltr559,
            plus,
        })
    }

    fn not_fitted() -> SensorError {
        SensorError::KindMsg(
            SensorErrorKind::Initialization,
            "sensor is only fitted to the Enviro+",
        )
    }
}

impl EnviroSensors for EnviroBoard {
    fn temperature(&mut self) -> Result<TemperatureCelsius, SensorError> {
        self.bme280.measure(&mut self.bus).map(|m| m.temperature)
    }

    fn pressure(&mut self) -> Result<Pressure, SensorError> {
        self.bme280.measure(&mut self.bus).map(|m| m.pressure)
    }

    fn humidity(&mut self) -> Result<Humidity, SensorError> {
        self.bme280.measure(&mut self.bus).map(|m| m.humidity)
    }

    fn gas(&mut self) -> Result<GasReading, SensorError> {
        match &self.plus {
            Some(p) => p.gas.read_gas(&mut self.bus),
            None => Err(Self::not_fitted()),
        }
    }

    fn light(&mut self) -> Result<LightReading, SensorError> {
        self.ltr559.read(&mut self.bus)
    }

    fn particulates(&mut self) -> Result<ParticulateReading, SensorError> {
        match self.plus.as_mut() {
            Some(p) => p.pms.read(),
            None => Err(Self::not_fitted()),
        }
    }
}

impl Debug for EnviroBoard {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnviroBoard")
            .field("bme280", &self.bme280)
            .field("ltr559", &self.ltr559)
            .field("plus", &self.plus.is_some())
            .finish()
    }
}
