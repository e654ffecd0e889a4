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

use clap::Parser;
use enviro::config::SensorArgs;
use enviro::logging;
use enviro::metrics::EnviroMetrics;
use enviro::poll::{run_poller, Poller};
use enviro::sensor::{
    BusReset, Compensator, CpuTemperature, EnviroBoard, EnviroSensors, I2cDetectReset, NopReset, SensorAccess,
    SimulatedCpu, SimulatedSensors, ThermalZone,
};
use prometheus::Registry;
use std::process;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Read Pimoroni Enviro and Enviro+ sensors and log the values
///
/// Useful for checking that the board is connected correctly and that readings
/// look sensible before running the exporter.
#[derive(Debug, Parser)]
#[clap(name = "enviro-probe", version = clap::crate_version!())]
struct ProbeApplication {
    #[clap(flatten)]
    sensors: SensorArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = ProbeApplication::parse();
    if let Err(e) = logging::init(opts.sensors.log_level(), &opts.sensors.log_file) {
        eprintln!("enviro-probe: {}", e);
        process::exit(1);
    }

    let registry = Registry::new();
    let metrics = EnviroMetrics::new(&registry).unwrap_or_else(|e| {
        tracing::error!(message = "failed to register sensor metrics", error = %e);
        process::exit(1)
    });

    if opts.sensors.simulate {
        probe(SimulatedSensors::new(), NopReset, SimulatedCpu, &opts.sensors, metrics).await;
    } else {
        let board = EnviroBoard::open(&opts.sensors.board_config()).unwrap_or_else(|e| {
            tracing::error!(message = "failed to initialize sensors", error = %e);
            process::exit(1)
        });

        probe(
            board,
            I2cDetectReset::new(opts.sensors.i2c_bus),
            ThermalZone::new(opts.sensors.thermal_zone.clone()),
            &opts.sensors,
            metrics,
        )
        .await;
    }

    Ok(())
}

/// Poll the sensors and log every reading until interrupted.
async fn probe<S, R, C>(sensors: S, reset: R, cpu: C, opts: &SensorArgs, metrics: EnviroMetrics)
where
    S: EnviroSensors + Send + 'static,
    R: BusReset + Send + 'static,
    C: CpuTemperature + Send + 'static,
{
    let compensator = Compensator::new(Some(opts.factor), cpu);
    if let Some(factor) = compensator.factor() {
        tracing::info!(message = "using compensation factor to adjust temperature", factor = factor);
    }

    let access = SensorAccess::new(sensors, reset).with_metrics(metrics.access());
    let poller = Poller::new(access, compensator, metrics.clone(), opts.variant()).with_report();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run_poller(Arc::new(Mutex::new(poller)), opts.poll_interval(), shutdown_rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(message = "unable to wait for interrupt", error = %e);
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = handle.await {
        tracing::error!(message = "sensor poll task failed", error = %e);
    }

    tracing::info!(
        message = "probe stopped",
        polls = metrics.collections(),
        bus_resets = metrics.access().resets(),
    );
}
