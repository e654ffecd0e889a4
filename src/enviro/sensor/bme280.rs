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

use crate::sensor::bus::RegisterBus;
use crate::sensor::core::{Humidity, Pressure, SensorError, SensorErrorKind, TemperatureCelsius};
use std::thread;
use std::time::Duration;

pub(crate) const BME280_ADDRESS: u16 = 0x76;

const CHIP_ID: u8 = 0x60;
const REG_CHIP_ID: u8 = 0xD0;
const REG_RESET: u8 = 0xE0;
const REG_CALIB_00: u8 = 0x88;
const REG_CALIB_26: u8 = 0xE1;
const REG_CTRL_HUM: u8 = 0xF2;
const REG_STATUS: u8 = 0xF3;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_DATA: u8 = 0xF7;

const SOFT_RESET: u8 = 0xB6;
const STATUS_MEASURING: u8 = 0b0000_1000;
// Oversampling x1 for humidity, temperature, and pressure, forced mode.
const CTRL_HUM_X1: u8 = 0b0000_0001;
const CTRL_MEAS_FORCED_X1: u8 = 0b0010_0101;
const MAX_STATUS_POLLS: usize = 20;

pub(crate) const CALIB_00_SIZE: usize = 26;
pub(crate) const CALIB_26_SIZE: usize = 7;

/// Factory calibration parameters burned into each BME280, see section 4.2.2
/// of the datasheet.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Calibration {
    pub(crate) t1: u16,
    pub(crate) t2: i16,
    pub(crate) t3: i16,
    pub(crate) p1: u16,
    pub(crate) p2: i16,
    pub(crate) p3: i16,
    pub(crate) p4: i16,
    pub(crate) p5: i16,
    pub(crate) p6: i16,
    pub(crate) p7: i16,
    pub(crate) p8: i16,
    pub(crate) p9: i16,
    pub(crate) h1: u8,
    pub(crate) h2: i16,
    pub(crate) h3: u8,
    pub(crate) h4: i16,
    pub(crate) h5: i16,
    pub(crate) h6: i8,
}

impl Calibration {
    /// Parse calibration from registers 0x88 to 0xA1 and 0xE1 to 0xE7.
    pub(crate) fn from_registers(lower: &[u8; CALIB_00_SIZE], upper: &[u8; CALIB_26_SIZE]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([lower[i], lower[i + 1]]);
        let i16_at = |i: usize| i16::from_le_bytes([lower[i], lower[i + 1]]);

        Self {
            t1: u16_at(0),
            t2: i16_at(2),
            t3: i16_at(4),
            p1: u16_at(6),
            p2: i16_at(8),
            p3: i16_at(10),
            p4: i16_at(12),
            p5: i16_at(14),
            p6: i16_at(16),
            p7: i16_at(18),
            p8: i16_at(20),
            p9: i16_at(22),
            // 0xA0 is reserved, 0xA1 is H1
            h1: lower[25],
            h2: i16::from_le_bytes([upper[0], upper[1]]),
            h3: upper[2],
            // H4 and H5 are 12-bit signed values that share the nibbles of 0xE5
            h4: ((upper[3] as i8 as i16) << 4) | (upper[4] & 0x0F) as i16,
            h5: ((upper[5] as i8 as i16) << 4) | (upper[4] >> 4) as i16,
            h6: upper[6] as i8,
        }
    }

    /// Compensate a raw temperature, returning degrees celsius and the "fine"
    /// temperature used for pressure and humidity compensation.
    pub(crate) fn temperature(&self, adc_t: i32) -> (f64, f64) {
        let adc_t = adc_t as f64;
        let t1 = self.t1 as f64;

        let var1 = (adc_t / 16384.0 - t1 / 1024.0) * self.t2 as f64;
        let var2 = (adc_t / 131072.0 - t1 / 8192.0).powi(2) * self.t3 as f64;
        let t_fine = var1 + var2;

        (t_fine / 5120.0, t_fine)
    }

    /// Compensate a raw pressure, returning pascals.
    pub(crate) fn pressure(&self, adc_p: i32, t_fine: f64) -> f64 {
        let mut var1 = t_fine / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * self.p6 as f64 / 32768.0;
        var2 += var1 * self.p5 as f64 * 2.0;
        var2 = var2 / 4.0 + self.p4 as f64 * 65536.0;
        var1 = (self.p3 as f64 * var1 * var1 / 524288.0 + self.p2 as f64 * var1) / 524288.0;
        var1 = (1.0 + var1 / 32768.0) * self.p1 as f64;

        // Avoid division by zero
        if var1 == 0.0 {
            return 0.0;
        }

        let mut p = 1048576.0 - adc_p as f64;
        p = (p - var2 / 4096.0) * 6250.0 / var1;
        let var1 = self.p9 as f64 * p * p / 2147483648.0;
        let var2 = p * self.p8 as f64 / 32768.0;
        p + (var1 + var2 + self.p7 as f64) / 16.0
    }

    /// Compensate a raw humidity, returning relative humidity from 0 to 100.
    pub(crate) fn humidity(&self, adc_h: i32, t_fine: f64) -> f64 {
        let var = t_fine - 76800.0;
        let var = (adc_h as f64 - (self.h4 as f64 * 64.0 + self.h5 as f64 / 16384.0 * var))
            * (self.h2 as f64 / 65536.0
                * (1.0 + self.h6 as f64 / 67108864.0 * var * (1.0 + self.h3 as f64 / 67108864.0 * var)));
        let var = var * (1.0 - self.h1 as f64 * var / 524288.0);

        var.clamp(0.0, 100.0)
    }
}

/// Compensated temperature, pressure, and humidity from a single measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Measurement {
    pub(crate) temperature: TemperatureCelsius,
    pub(crate) pressure: Pressure,
    pub(crate) humidity: Humidity,
}

/// Bosch BME280 temperature, pressure, and humidity sensor.
///
/// Each measurement is taken in "forced" mode: the sensor takes a single
/// measurement and goes back to sleep, which keeps it from heating itself up.
#[derive(Debug)]
pub(crate) struct Bme280 {
    address: u16,
    calibration: Calibration,
}

impl Bme280 {
    pub(crate) fn init<B: RegisterBus>(bus: &mut B, address: u16) -> Result<Self, SensorError> {
        let id = bus.read_register(address, REG_CHIP_ID)?;
        if id != CHIP_ID {
            return Err(SensorError::KindMsg(
                SensorErrorKind::Initialization,
                "unexpected BME280 chip ID",
            ));
        }

        bus.write_register(address, REG_RESET, &[SOFT_RESET])?;
        thread::sleep(Duration::from_millis(10));

        let mut lower = [0u8; CALIB_00_SIZE];
        let mut upper = [0u8; CALIB_26_SIZE];
        bus.read_registers(address, REG_CALIB_00, &mut lower)?;
        bus.read_registers(address, REG_CALIB_26, &mut upper)?;
        let calibration = Calibration::from_registers(&lower, &upper);

        // Filter off, standby time doesn't apply in forced mode
        bus.write_register(address, REG_CONFIG, &[0])?;

        tracing::debug!(message = "initialized BME280", address = address, calibration = ?calibration);
        Ok(Self { address, calibration })
    }

    pub(crate) fn measure<B: RegisterBus>(&self, bus: &mut B) -> Result<Measurement, SensorError> {
        // Humidity settings only take effect after a write to ctrl_meas
        bus.write_register(self.address, REG_CTRL_HUM, &[CTRL_HUM_X1])?;
        bus.write_register(self.address, REG_CTRL_MEAS, &[CTRL_MEAS_FORCED_X1])?;

        let mut polls = 0;
        while bus.read_register(self.address, REG_STATUS)? & STATUS_MEASURING != 0 {
            polls += 1;
            if polls >= MAX_STATUS_POLLS {
                return Err(SensorError::KindMsg(
                    SensorErrorKind::Bus,
                    "timeout waiting for BME280 measurement",
                ));
            }

            thread::sleep(Duration::from_millis(2));
        }

        let mut raw = [0u8; 8];
        bus.read_registers(self.address, REG_DATA, &mut raw)?;

        let adc_p = ((raw[0] as i32) << 12) | ((raw[1] as i32) << 4) | ((raw[2] as i32) >> 4);
        let adc_t = ((raw[3] as i32) << 12) | ((raw[4] as i32) << 4) | ((raw[5] as i32) >> 4);
        let adc_h = ((raw[6] as i32) << 8) | (raw[7] as i32);

        let (temperature, t_fine) = self.calibration.temperature(adc_t);
        let pressure = self.calibration.pressure(adc_p, t_fine) / 100.0;
        let humidity = self.calibration.humidity(adc_h, t_fine);

        tracing::trace!(
            message = "read BME280 measurement",
            adc_t = adc_t,
            adc_p = adc_p,
            adc_h = adc_h,
            temperature = temperature,
            pressure = pressure,
            humidity = humidity,
        );

        Ok(Measurement {
            temperature: temperature.into(),
            pressure: pressure.into(),
            humidity: humidity.into(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::{Bme280, Calibration, BME280_ADDRESS, CALIB_00_SIZE, CALIB_26_SIZE};
    use crate::sensor::core::SensorErrorKind;
    use crate::sensor::test::MockRegisterBus;

    // Example calibration values from section 8.2 of the BME280 datasheet (which are
    // the same as the BMP280 for temperature and pressure).
    fn datasheet_calibration() -> Calibration {
        Calibration {
            t1: 27504,
            t2: 26435,
            t3: -1000,
            p1: 36477,
            p2: -10685,
            p3: 3024,
            p4: 2855,
            p5: 140,
            p6: -7,
            p7: 15500,
            p8: -14600,
            p9: 6000,
            ..Default::default()
        }
    }

    #[test]
    fn test_calibration_from_registers() {
        let mut lower = [0u8; CALIB_00_SIZE];
        lower[0..2].copy_from_slice(&27504u16.to_le_bytes());
        lower[2..4].copy_from_slice(&26435i16.to_le_bytes());
        lower[4..6].copy_from_slice(&(-1000i16).to_le_bytes());
        lower[22..24].copy_from_slice(&6000i16.to_le_bytes());
        lower[25] = 75;

        let upper: [u8; CALIB_26_SIZE] = [0x6A, 0x01, 0x00, 0x13, 0x25, 0x03, 0x1E];
        let cal = Calibration::from_registers(&lower, &upper);

        assert_eq!(27504, cal.t1);
        assert_eq!(26435, cal.t2);
        assert_eq!(-1000, cal.t3);
        assert_eq!(6000, cal.p9);
        assert_eq!(75, cal.h1);
        assert_eq!(362, cal.h2);
        assert_eq!(0, cal.h3);
        // 0x13 << 4 | 0x5
        assert_eq!(309, cal.h4);
        // 0x03 << 4 | 0x2
        assert_eq!(50, cal.h5);
        assert_eq!(30, cal.h6);
    }

    #[test]
    fn test_calibration_negative_h4() {
        let lower = [0u8; CALIB_00_SIZE];
        let upper: [u8; CALIB_26_SIZE] = [0, 0, 0, 0xFF, 0x0F, 0, 0];
        let cal = Calibration::from_registers(&lower, &upper);

        // 0xFF is -1 as a signed byte, -16 | 0xF
        assert_eq!(-1, cal.h4);
    }

    #[test]
    fn test_compensate_temperature_datasheet() {
        let cal = datasheet_calibration();
        let (t, _) = cal.temperature(519888);

        assert!((t - 25.08).abs() < 0.01, "temperature {}", t);
    }

    #[test]
    fn test_compensate_pressure_datasheet() {
        let cal = datasheet_calibration();
        let (_, t_fine) = cal.temperature(519888);
        let p = cal.pressure(415148, t_fine);

        assert!((p - 100653.0).abs() < 50.0, "pressure {}", p);
    }

    #[test]
    fn test_compensate_humidity_clamped() {
        let cal = Calibration::default();
        let (_, t_fine) = datasheet_calibration().temperature(519888);

        assert_eq!(0.0, cal.humidity(0, t_fine));
    }

    #[test]
    fn test_init_wrong_chip() {
        let mut bus = MockRegisterBus::default();
        bus.set(BME280_ADDRESS, 0xD0, &[0x58]);

        let res = Bme280::init(&mut bus, BME280_ADDRESS);
        assert_eq!(SensorErrorKind::Initialization, res.unwrap_err().kind());
    }

    #[test]
    fn test_measure_forced_mode() {
        let mut bus = MockRegisterBus::default();
        bus.set(BME280_ADDRESS, 0xD0, &[0x60]);

        let sensor = Bme280::init(&mut bus, BME280_ADDRESS).unwrap();
        let res = sensor.measure(&mut bus);

        assert!(res.is_ok());
        assert!(bus.was_written(BME280_ADDRESS, 0xF4, &[0b0010_0101]));
        assert!(bus.was_written(BME280_ADDRESS, 0xE0, &[0xB6]));
    }
}
