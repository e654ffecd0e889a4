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
use crate::sensor::core::{LightReading, SensorError, SensorErrorKind};
use std::thread;
use std::time::Duration;

pub(crate) const LTR559_ADDRESS: u16 = 0x23;

const PART_NUMBER: u8 = 0x09;
const REG_ALS_CONTROL: u8 = 0x80;
const REG_PS_CONTROL: u8 = 0x81;
const REG_PS_N_PULSES: u8 = 0x83;
const REG_PS_MEAS_RATE: u8 = 0x84;
const REG_ALS_MEAS_RATE: u8 = 0x85;
const REG_PART_ID: u8 = 0x86;
const REG_ALS_DATA_CH1: u8 = 0x88;
const REG_PS_DATA: u8 = 0x8D;

const ALS_CONTROL_RESET: u8 = 0b0000_0010;
const ALS_GAIN: f64 = 4.0;
// Gain 4x in bits 4:2, active mode in bit 0
const ALS_CONTROL_ACTIVE: u8 = 0b0000_1001;
const PS_CONTROL_ACTIVE: u8 = 0b0000_0011;
const ALS_INTEGRATION_MS: f64 = 50.0;
// 50ms integration time in bits 5:3, 50ms repeat rate in bits 2:0
const ALS_MEAS_RATE_50MS: u8 = 0b0000_1000;
const PS_MEAS_RATE_100MS: u8 = 0b0000_0010;

// Coefficients per channel ratio range, from the LTR559 appendix A.
const CH0_COEFFICIENTS: [f64; 4] = [17743.0, 42785.0, 5926.0, 0.0];
const CH1_COEFFICIENTS: [f64; 4] = [-11059.0, 19548.0, -1185.0, 0.0];

/// Convert raw visible+IR (channel 0) and IR (channel 1) counts into lux.
pub(crate) fn lux_from_channels(ch0: u16, ch1: u16, gain: f64, integration_ms: f64) -> f64 {
    let ch0 = ch0 as f64;
    let ch1 = ch1 as f64;

    let ratio = if ch0 + ch1 > 0.0 {
        (ch1 * 1000.0 / (ch1 + ch0)).trunc()
    } else {
        1000.0
    };

    let idx = if ratio < 450.0 {
        0
    } else if ratio < 640.0 {
        1
    } else if ratio < 850.0 {
        2
    } else {
        3
    };

    let lux = ch0 * CH0_COEFFICIENTS[idx] - ch1 * CH1_COEFFICIENTS[idx];
    lux / (integration_ms / 100.0) / gain / 10000.0
}

/// Parse the 11-bit proximity count from the two proximity data registers.
pub(crate) fn proximity_from_registers(data: &[u8; 2]) -> u16 {
    (data[0] as u16) | (((data[1] & 0x07) as u16) << 8)
}

/// Lite-On LTR559 ambient light and proximity sensor.
#[derive(Debug)]
pub(crate) struct Ltr559 {
    address: u16,
}

impl Ltr559 {
    pub(crate) fn init<B: RegisterBus>(bus: &mut B, address: u16) -> Result<Self, SensorError> {
        let part = bus.read_register(address, REG_PART_ID)? >> 4;
        if part != PART_NUMBER {
            return Err(SensorError::KindMsg(
                SensorErrorKind::Initialization,
                "unexpected LTR559 part number",
            ));
        }

        bus.write_register(address, REG_ALS_CONTROL, &[ALS_CONTROL_RESET])?;
        thread::sleep(Duration::from_millis(10));

        bus.write_register(address, REG_ALS_CONTROL, &[ALS_CONTROL_ACTIVE])?;
        bus.write_register(address, REG_PS_CONTROL, &[PS_CONTROL_ACTIVE])?;
        bus.write_register(address, REG_PS_N_PULSES, &[1])?;
        bus.write_register(address, REG_PS_MEAS_RATE, &[PS_MEAS_RATE_100MS])?;
        bus.write_register(address, REG_ALS_MEAS_RATE, &[ALS_MEAS_RATE_50MS])?;

        tracing::debug!(message = "initialized LTR559", address = address);
        Ok(Self { address })
    }

    pub(crate) fn read<B: RegisterBus>(&self, bus: &mut B) -> Result<LightReading, SensorError> {
        // Channel 1 comes first, each channel is a little-endian u16
        let mut als = [0u8; 4];
        bus.read_registers(self.address, REG_ALS_DATA_CH1, &mut als)?;
        let ch1 = u16::from_le_bytes([als[0], als[1]]);
        let ch0 = u16::from_le_bytes([als[2], als[3]]);

        let mut ps = [0u8; 2];
        bus.read_registers(self.address, REG_PS_DATA, &mut ps)?;

        let lux = lux_from_channels(ch0, ch1, ALS_GAIN, ALS_INTEGRATION_MS);
        let proximity = proximity_from_registers(&ps);

        tracing::trace!(message = "read LTR559 channels", ch0 = ch0, ch1 = ch1, lux = lux, proximity = proximity);
        Ok(LightReading {
            lux,
            proximity: proximity.into(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::{lux_from_channels, proximity_from_registers, Ltr559, LTR559_ADDRESS};
    use crate::sensor::core::SensorErrorKind;
    use crate::sensor::test::MockRegisterBus;

    #[test]
    fn test_lux_low_ir_ratio() {
        // ratio = 90, first set of coefficients
        let lux = lux_from_channels(1000, 100, 4.0, 50.0);
        assert!((lux - 942.445).abs() < 0.001, "lux {}", lux);
    }

    #[test]
    fn test_lux_high_ir_ratio() {
        // ratio >= 850, coefficients are all zero
        let lux = lux_from_channels(10, 990, 4.0, 50.0);
        assert_eq!(0.0, lux);
    }

    #[test]
    fn test_lux_dark() {
        assert_eq!(0.0, lux_from_channels(0, 0, 4.0, 50.0));
    }

    #[test]
    fn test_proximity_masks_saturation_bit() {
        // Bit 7 of the high byte is the saturation flag, not data
        assert_eq!(0x7FF, proximity_from_registers(&[0xFF, 0xFF]));
        assert_eq!(0x102, proximity_from_registers(&[0x02, 0x01]));
    }

    #[test]
    fn test_init_and_read() {
        let mut bus = MockRegisterBus::default();
        bus.set(LTR559_ADDRESS, 0x86, &[0x92]);
        bus.set(LTR559_ADDRESS, 0x88, &[100, 0, 0xE8, 0x03]);
        bus.set(LTR559_ADDRESS, 0x8D, &[0x20, 0x00]);

        let sensor = Ltr559::init(&mut bus, LTR559_ADDRESS).unwrap();
        let reading = sensor.read(&mut bus).unwrap();

        assert!((reading.lux - 942.445).abs() < 0.001);
        assert_eq!(32.0, reading.proximity);
    }

    #[test]
    fn test_init_wrong_part() {
        let mut bus = MockRegisterBus::default();
        bus.set(LTR559_ADDRESS, 0x86, &[0x10]);

        let res = Ltr559::init(&mut bus, LTR559_ADDRESS);
        assert_eq!(SensorErrorKind::Initialization, res.unwrap_err().kind());
    }
}
