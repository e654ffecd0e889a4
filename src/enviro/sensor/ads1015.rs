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
use crate::sensor::core::{GasReading, SensorError, SensorErrorKind};
use std::thread;
use std::time::Duration;

pub(crate) const ADS1015_ADDRESS: u16 = 0x49;

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

const CONFIG_OS_SINGLE: u16 = 1 << 15;
const CONFIG_PGA_6_144V: u16 = 0b000 << 9;
const CONFIG_MODE_SINGLE: u16 = 1 << 8;
const CONFIG_DR_1600SPS: u16 = 0b100 << 5;
const CONFIG_COMP_DISABLE: u16 = 0b11;

const GAIN_VOLTS: f64 = 6.144;
const MAX_CONVERSION_POLLS: usize = 10;

/// Supply voltage of the gas sensor voltage dividers.
const SUPPLY_VOLTS: f64 = 3.3;
/// Load resistor of each MICS6814 element on the Enviro+.
const LOAD_OHMS: f64 = 56000.0;

/// Single-ended ADC inputs wired to each MICS6814 element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Channel {
    Oxidising,
    Reducing,
    Nh3,
}

impl Channel {
    /// Input multiplexer bits for this channel measured against ground.
    fn mux(&self) -> u16 {
        match self {
            Channel::Oxidising => 0b100 << 12,
            Channel::Reducing => 0b101 << 12,
            Channel::Nh3 => 0b110 << 12,
        }
    }
}

/// Convert the 12-bit, left-aligned value of the conversion register to volts.
pub(crate) fn voltage_from_raw(raw: [u8; 2]) -> f64 {
    let value = i16::from_be_bytes(raw) >> 4;
    value as f64 / 2047.0 * GAIN_VOLTS
}

/// Resistance of a gas sensing element based on the voltage across its load resistor.
///
/// A voltage at the supply rail means no current through the sensor which is
/// reported as zero rather than dividing by zero.
pub(crate) fn resistance(volts: f64) -> f64 {
    let divisor = SUPPLY_VOLTS - volts;
    if divisor == 0.0 {
        0.0
    } else {
        volts * LOAD_OHMS / divisor
    }
}

/// TI ADS1015 12-bit ADC used to read the MICS6814 gas sensor on the Enviro+.
#[derive(Debug)]
pub(crate) struct Ads1015 {
    address: u16,
}

impl Ads1015 {
    pub(crate) fn new(address: u16) -> Self {
        Self { address }
    }

    pub(crate) fn read_voltage<B: RegisterBus>(&self, bus: &mut B, channel: Channel) -> Result<f64, SensorError> {
        let config =
            CONFIG_OS_SINGLE | channel.mux() | CONFIG_PGA_6_144V | CONFIG_MODE_SINGLE | CONFIG_DR_1600SPS | CONFIG_COMP_DISABLE;
        bus.write_register(self.address, REG_CONFIG, &config.to_be_bytes())?;

        // The OS bit reads as zero while a conversion is in progress
        let mut polls = 0;
        loop {
            let mut status = [0u8; 2];
            bus.read_registers(self.address, REG_CONFIG, &mut status)?;
            if u16::from_be_bytes(status) & CONFIG_OS_SINGLE != 0 {
                break;
            }

            polls += 1;
            if polls >= MAX_CONVERSION_POLLS {
                return Err(SensorError::KindMsg(
                    SensorErrorKind::Bus,
                    "timeout waiting for ADS1015 conversion",
                ));
            }

            thread::sleep(Duration::from_millis(1));
        }

        let mut raw = [0u8; 2];
        bus.read_registers(self.address, REG_CONVERSION, &mut raw)?;
        Ok(voltage_from_raw(raw))
    }

    pub(crate) fn read_gas<B: RegisterBus>(&self, bus: &mut B) -> Result<GasReading, SensorError> {
        let oxidising = self.read_voltage(bus, Channel::Oxidising)?;
        let reducing = self.read_voltage(bus, Channel::Reducing)?;
        let nh3 = self.read_voltage(bus, Channel::Nh3)?;

        tracing::trace!(
            message = "read MICS6814 voltages",
            oxidising = oxidising,
            reducing = reducing,
            nh3 = nh3,
        );

        Ok(GasReading {
            oxidising: resistance(oxidising),
            reducing: resistance(reducing),
            nh3: resistance(nh3),
        })
    }
}

#[cfg(test)]
mod test {
    use super::{resistance, voltage_from_raw, Ads1015, Channel, ADS1015_ADDRESS};
    use crate::sensor::test::MockRegisterBus;

    #[test]
    fn test_voltage_full_scale() {
        assert!((voltage_from_raw([0x7F, 0xF0]) - 6.144).abs() < 1e-9);
    }

    #[test]
    fn test_voltage_negative() {
        let v = voltage_from_raw([0x80, 0x00]);
        assert!((v - (-2048.0 / 2047.0 * 6.144)).abs() < 1e-9);
    }

    #[test]
    fn test_voltage_ignores_low_nibble() {
        assert_eq!(voltage_from_raw([0x10, 0x00]), voltage_from_raw([0x10, 0x0F]));
    }

    #[test]
    fn test_resistance_midpoint() {
        assert!((resistance(1.65) - 56000.0).abs() < 1e-6);
    }

    #[test]
    fn test_resistance_rail() {
        assert_eq!(0.0, resistance(3.3));
    }

    #[test]
    fn test_read_voltage_single_shot() {
        let mut bus = MockRegisterBus::default();
        bus.set(ADS1015_ADDRESS, 0x00, &[0x7F, 0xF0]);

        let adc = Ads1015::new(ADS1015_ADDRESS);
        let v = adc.read_voltage(&mut bus, Channel::Reducing).unwrap();

        assert!((v - 6.144).abs() < 1e-9);
        // OS | in1/gnd | 6.144V | single | 1600sps | comparator disabled
        assert!(bus.was_written(ADS1015_ADDRESS, 0x01, &[0xD1, 0x83]));
    }

    #[test]
    fn test_read_gas_all_channels() {
        let mut bus = MockRegisterBus::default();
        bus.set(ADS1015_ADDRESS, 0x00, &[0x10, 0x00]);

        let adc = Ads1015::new(ADS1015_ADDRESS);
        let gas = adc.read_gas(&mut bus).unwrap();
        let expected = resistance(voltage_from_raw([0x10, 0x00]));

        assert_eq!(expected, gas.oxidising);
        assert_eq!(expected, gas.reducing);
        assert_eq!(expected, gas.nh3);
    }
}
