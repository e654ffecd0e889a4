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

use crate::metrics::EnviroMetrics;
use crate::sensor::{
    BusReset, Compensator, CpuTemperature, EnviroSensors, GasReading, Humidity, LightReading, ParticulateReading,
    Pressure, SensorAccess, TemperatureCelsius,
};
use std::fmt::{self, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, Level};

/// Which board is attached to the Raspberry PI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Temperature, pressure, humidity, and light only
    Enviro,
    /// Everything the Enviro has plus gas and particulate sensors
    EnviroPlus,
}

impl Variant {
    pub fn from_enviro_flag(enviro: bool) -> Self {
        if enviro {
            Variant::Enviro
        } else {
            Variant::EnviroPlus
        }
    }

    pub fn has_air_quality(&self) -> bool {
        *self == Variant::EnviroPlus
    }
}

/// Values read from the sensors during a single poll.
///
/// Sensors that couldn't be read, or that aren't present on the board, are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Readings {
    pub temperature: Option<TemperatureCelsius>,
    pub pressure: Option<Pressure>,
    pub humidity: Option<Humidity>,
    pub light: Option<LightReading>,
    pub gas: Option<GasReading>,
    pub particulates: Option<ParticulateReading>,
}

/// Display an optional reading, or `none` when it's missing.
pub struct Optional<'a, T>(pub &'a Option<T>);

impl<'a, T: fmt::Display> fmt::Display for Optional<'a, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => fmt::Display::fmt(v, f),
            None => f.write_str("none"),
        }
    }
}

/// Read every sensor and update the corresponding metrics.
///
/// The poller is the only thing that writes to the metrics. Failed reads leave
/// the previous value of their metrics in place.
pub struct Poller<S, R, C> {
    access: SensorAccess<S, R>,
    compensator: Compensator<C>,
    metrics: EnviroMetrics,
    variant: Variant,
    report: bool,
}

impl<S, R, C> Poller<S, R, C>
where
    S: EnviroSensors,
    R: BusReset,
    C: CpuTemperature,
{
    pub fn new(access: SensorAccess<S, R>, compensator: Compensator<C>, metrics: EnviroMetrics, variant: Variant) -> Self {
        Self {
            access,
            compensator,
            metrics,
            variant,
            report: false,
        }
    }

    /// Log the values read by each poll at `INFO`.
    pub fn with_report(mut self) -> Self {
        self.report = true;
        self
    }

    pub fn poll_once(&mut self) -> Readings {
        self.metrics.collection();

        let mut readings = Readings {
            temperature: self.access.temperature().map(|t| self.compensator.compensate(t)),
            pressure: self.access.pressure(),
            humidity: self.access.humidity(),
            light: self.access.light(),
            ..Default::default()
        };

        if self.variant.has_air_quality() {
            readings.gas = self.access.gas();
            readings.particulates = self.access.particulates();
        }

        if let Some(t) = readings.temperature {
            self.metrics.set_temperature(t);
        }

        if let Some(p) = readings.pressure {
            self.metrics.set_pressure(p);
        }

        if let Some(h) = readings.humidity {
            self.metrics.set_humidity(h);
        }

        if let Some(l) = &readings.light {
            self.metrics.set_light(l);
        }

        if let Some(g) = &readings.gas {
            self.metrics.set_gas(g);
        }

        if let Some(pm) = &readings.particulates {
            self.metrics.set_particulates(pm);
        }

        if self.report {
            self.log_readings(&readings);
        }

        if tracing::enabled!(Level::DEBUG) {
            match serde_json::to_string(&self.metrics.snapshot()) {
                Ok(data) => tracing::debug!(message = "sensor data", data = %data),
                Err(e) => tracing::warn!(message = "unable to serialize sensor data", error = %e),
            }
        }

        readings
    }

    fn log_readings(&self, r: &Readings) {
        tracing::info!(
            temperature = %Optional(&r.temperature),
            pressure = %Optional(&r.pressure),
            humidity = %Optional(&r.humidity),
            light = %Optional(&r.light),
        );

        if self.variant.has_air_quality() {
            tracing::info!(gas = %Optional(&r.gas), particulates = %Optional(&r.particulates));
        }
    }
}

/// Poll the sensors every `period` until shutdown is signalled.
///
/// Reading sensors blocks for a while (tens of milliseconds for the I2C devices,
/// up to several seconds for the particulate sensor) so each poll is run on a
/// thread where blocking is acceptable.
pub async fn run_poller<S, R, C>(poller: Arc<Mutex<Poller<S, R, C>>>, period: Duration, mut shutdown: watch::Receiver<bool>)
where
    S: EnviroSensors + Send + 'static,
    R: BusReset + Send + 'static,
    C: CpuTemperature + Send + 'static,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }

        let poller_ref = poller.clone();
        let res = task::spawn_blocking(move || {
            let mut p = poller_ref.lock().unwrap_or_else(PoisonError::into_inner);
            p.poll_once();
        })
        .instrument(tracing::span!(Level::DEBUG, "sensor_poll"))
        .await;

        if let Err(e) = res {
            tracing::error!(message = "sensor poll task failed", error = %e);
        }
    }

    tracing::info!("sensor polling stopped");
}

#[cfg(test)]
mod test {
    use super::{run_poller, Optional, Poller, Variant};
    use crate::metrics::EnviroMetrics;
    use crate::sensor::{
        Compensator, CountingReset, EventRecorder, Failures, MockSensors, Pressure, SensorAccess, SensorErrorKind,
        SequenceCpuTemperature, TemperatureCelsius,
    };
    use prometheus::Registry;
    use tracing::Level;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::watch;

    type TestPoller = Poller<MockSensors, CountingReset, SequenceCpuTemperature>;

    fn poller(sensors: MockSensors, factor: Option<f64>, variant: Variant) -> (TestPoller, EnviroMetrics, CountingReset) {
        let metrics = EnviroMetrics::new(&Registry::new()).unwrap();
        let reset = CountingReset::default();
        let access = SensorAccess::new(sensors, reset.clone()).with_metrics(metrics.access());
        let compensator = Compensator::new(factor, SequenceCpuTemperature::new(vec![50.0]));

        (Poller::new(access, compensator, metrics.clone(), variant), metrics, reset)
    }

    #[test]
    fn test_poll_sets_all_gauges() {
        let (mut p, metrics, reset) = poller(MockSensors::default(), None, Variant::EnviroPlus);
        p.poll_once();

        let s = metrics.snapshot();
        assert_eq!(22.0, s.temperature);
        assert_eq!(1013.0, s.pressure);
        assert_eq!(45.0, s.humidity);
        assert_eq!(20000.0, s.oxidising);
        assert_eq!(300000.0, s.reducing);
        assert_eq!(150000.0, s.nh3);
        assert_eq!(120.0, s.lux);
        assert_eq!(3.0, s.proximity);
        assert_eq!(4.0, s.pm1);
        assert_eq!(9.0, s.pm25);
        assert_eq!(15.0, s.pm10);
        assert_eq!(1, metrics.collections());
        assert_eq!(0, reset.resets());
    }

    #[test]
    fn test_poll_compensates_temperature() {
        let (mut p, metrics, _) = poller(MockSensors::default(), Some(2.0), Variant::EnviroPlus);
        p.poll_once();

        // 22 - ((50 - 22) / 2)
        assert_eq!(8.0, metrics.snapshot().temperature);
    }

    #[test]
    fn test_poll_bus_failure_keeps_previous_value() {
        let sensors = MockSensors {
            failures: Failures {
                pressure: Some(SensorErrorKind::Bus),
                ..Default::default()
            },
            ..Default::default()
        };

        let (mut p, metrics, reset) = poller(sensors, None, Variant::EnviroPlus);
        metrics.set_pressure(Pressure::from(990.0));
        p.poll_once();

        assert_eq!(990.0, metrics.snapshot().pressure);
        assert_eq!(45.0, metrics.snapshot().humidity);
        assert_eq!(1, reset.resets());
    }

    #[test]
    fn test_poll_failed_read_has_no_reading() {
        let sensors = MockSensors {
            failures: Failures {
                pressure: Some(SensorErrorKind::Bus),
                particulates: Some(SensorErrorKind::ReadTimeout),
                ..Default::default()
            },
            ..Default::default()
        };

        let (mut p, metrics, _) = poller(sensors, None, Variant::EnviroPlus);
        metrics.set_pressure(Pressure::from(990.0));
        let readings = p.poll_once();

        assert_eq!(None, readings.pressure);
        assert_eq!(None, readings.particulates);
        assert_eq!(Some(TemperatureCelsius::from(22.0)), readings.temperature);
        assert!(readings.gas.is_some());
        assert_eq!(990.0, metrics.snapshot().pressure);
    }

    #[test]
    fn test_poll_report_logs_missing_readings() {
        let sensors = MockSensors {
            failures: Failures {
                pressure: Some(SensorErrorKind::Bus),
                particulates: Some(SensorErrorKind::ReadTimeout),
                ..Default::default()
            },
            ..Default::default()
        };

        let (p, metrics, _) = poller(sensors, None, Variant::EnviroPlus);
        let mut p = p.with_report();
        metrics.set_pressure(Pressure::from(990.0));

        let recorder = EventRecorder::default();
        recorder.record(|| p.poll_once());

        let info = recorder.fields(Level::INFO).join(" ");
        assert!(info.contains("pressure=none"), "unexpected readings: {}", info);
        assert!(info.contains("particulates=none"), "unexpected readings: {}", info);
        assert!(info.contains("temperature=22c"), "unexpected readings: {}", info);
        assert!(!info.contains("990"), "unexpected readings: {}", info);
    }

    #[test]
    fn test_optional_display() {
        assert_eq!("none", Optional(&None::<Pressure>).to_string());
        assert_eq!("1013hPa", Optional(&Some(Pressure::from(1013.0))).to_string());
    }

    #[test]
    fn test_poll_particulate_timeout_no_reset() {
        let sensors = MockSensors {
            failures: Failures {
                particulates: Some(SensorErrorKind::ReadTimeout),
                ..Default::default()
            },
            ..Default::default()
        };

        let (mut p, metrics, reset) = poller(sensors, None, Variant::EnviroPlus);
        p.poll_once();

        assert_eq!(0.0, metrics.snapshot().pm25);
        assert_eq!(0, reset.resets());
    }

    #[test]
    fn test_enviro_variant_skips_air_quality() {
        let sensors = MockSensors::default();
        let calls = sensors.calls.clone();
        let (mut p, metrics, _) = poller(sensors, None, Variant::Enviro);

        for _ in 0..25 {
            p.poll_once();
        }

        assert_eq!(0, calls.gas.load(Ordering::SeqCst));
        assert_eq!(0, calls.particulates.load(Ordering::SeqCst));
        assert_eq!(25, calls.temperature.load(Ordering::SeqCst));
        assert_eq!(25, calls.light.load(Ordering::SeqCst));
        assert_eq!(0.0, metrics.snapshot().oxidising);
    }

    #[test]
    fn test_variant_from_flag() {
        assert_eq!(Variant::Enviro, Variant::from_enviro_flag(true));
        assert_eq!(Variant::EnviroPlus, Variant::from_enviro_flag(false));
        assert!(!Variant::Enviro.has_air_quality());
    }

    #[tokio::test]
    async fn test_run_poller_until_shutdown() {
        let (p, metrics, _) = poller(MockSensors::default(), None, Variant::EnviroPlus);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_poller(Arc::new(Mutex::new(p)), Duration::from_millis(5), rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let polls = metrics.collections();
        assert!(polls >= 1, "expected at least one poll, got {}", polls);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(polls, metrics.collections());
    }
}
