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

use crate::sensor::core::{CpuTemperature, TemperatureCelsius};
use std::collections::VecDeque;

pub const CPU_WINDOW_SIZE: usize = 5;

/// Correct temperature readings for heat leaking from the CPU of the Raspberry PI
/// into a sensor mounted directly on top of it.
///
/// The correction is based on the difference between the sensor temperature and a
/// rolling average of the CPU temperature, divided by a tuning factor. Decrease the
/// factor to adjust the temperature down (stronger correction), increase it to
/// adjust the temperature up (weaker correction).
#[derive(Debug)]
pub struct Compensator<C> {
    factor: Option<f64>,
    cpu: C,
    window: VecDeque<f64>,
}

impl<C: CpuTemperature> Compensator<C> {
    /// Create a new compensator. A factor of zero disables compensation.
    pub fn new(factor: Option<f64>, cpu: C) -> Self {
        Self {
            factor: factor.filter(|f| *f != 0.0),
            cpu,
            window: VecDeque::with_capacity(CPU_WINDOW_SIZE),
        }
    }

    pub fn factor(&self) -> Option<f64> {
        self.factor
    }

    /// CPU temperature samples currently used for the rolling average, oldest first.
    pub fn window(&self) -> impl ExactSizeIterator<Item = &f64> {
        self.window.iter()
    }

    pub fn compensate(&mut self, raw: TemperatureCelsius) -> TemperatureCelsius {
        let factor = match self.factor {
            Some(f) => f,
            None => return raw,
        };

        let sample = match self.cpu.cpu_temperature() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(message = "unable to read cpu temperature, skipping compensation", error = %e);
                return raw;
            }
        };

        // Seed the window with the first sample so there's something to average
        // right away, even though it isn't real history yet.
        if self.window.is_empty() {
            self.window.extend(std::iter::repeat(sample).take(CPU_WINDOW_SIZE));
        }

        self.window.pop_front();
        self.window.push_back(sample);

        let avg_cpu = self.window.iter().sum::<f64>() / self.window.len() as f64;
        let raw = f64::from(raw);
        let corrected = raw - ((avg_cpu - raw) / factor);

        tracing::trace!(
            message = "compensated temperature",
            raw = raw,
            avg_cpu = avg_cpu,
            factor = factor,
            corrected = corrected,
        );

        corrected.into()
    }
}
