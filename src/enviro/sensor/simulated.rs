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

use crate::sensor::core::{
    BusReset, CpuTemperature, EnviroSensors, GasReading, Humidity, LightReading, ParticulateReading, Pressure,
    SensorError, TemperatureCelsius,
};

/// Sensors that don't touch any hardware, for running somewhere other than a
/// Raspberry PI with an Enviro board attached.
///
/// Readings drift slowly and predictably around typical indoor values, advancing
/// one step every time temperature is read.
#[derive(Debug, Default)]
pub struct SimulatedSensors {
    step: u64,
}

impl SimulatedSensors {
    pub fn new() -> Self {
        Self::default()
    }

    fn wave(&self, period: u64, amplitude: f64) -> f64 {
        let phase = (self.step % period) as f64 / period as f64;
        (phase * std::f64::consts::TAU).sin() * amplitude
    }
}

impl EnviroSensors for SimulatedSensors {
    fn temperature(&mut self) -> Result<TemperatureCelsius, SensorError> {
        self.step += 1;
        Ok((21.0 + self.wave(600, 2.0)).into())
    }

    fn pressure(&mut self) -> Result<Pressure, SensorError> {
        Ok((1013.25 + self.wave(3600, 4.0)).into())
    }

    fn humidity(&mut self) -> Result<Humidity, SensorError> {
        Ok((45.0 + self.wave(900, 5.0)).into())
    }

    fn gas(&mut self) -> Result<GasReading, SensorError> {
        Ok(GasReading {
            oxidising: 20000.0 + self.wave(300, 5000.0),
            reducing: 400000.0 + self.wave(450, 100000.0),
            nh3: 120000.0 + self.wave(500, 30000.0),
        })
    }

    fn light(&mut self) -> Result<LightReading, SensorError> {
        Ok(LightReading {
            lux: (150.0 + self.wave(1200, 100.0)).max(0.0),
            proximity: 0.0,
        })
    }

    fn particulates(&mut self) -> Result<ParticulateReading, SensorError> {
        let base = (5.0 + self.wave(200, 3.0)).round() as u16;
        Ok(ParticulateReading {
            pm1_standard: base,
            pm25_standard: base + 3,
            pm10_standard: base + 5,
            pm1_atmospheric: base,
            pm25_atmospheric: base + 3,
            pm10_atmospheric: base + 5,
            counts: [base * 100, base * 30, base * 6, base, 0, 0],
        })
    }
}

/// CPU temperature that's always a little warmer than the simulated room.
#[derive(Debug, Default)]
pub struct SimulatedCpu;

impl CpuTemperature for SimulatedCpu {
    fn cpu_temperature(&mut self) -> Result<f64, SensorError> {
        Ok(45.0)
    }
}

/// Bus reset for the simulated sensors, which never need one.
#[derive(Debug, Default)]
pub struct NopReset;

impl BusReset for NopReset {
    fn reset(&mut self) {
        // NOP
    }
}
