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

use clap::{ArgAction, Parser};
use enviro::config::{parse_bool, InfluxArgs, LuftdatenArgs, SensorArgs};
use enviro::forward::{http_client, sensor_id, Forwarder, InfluxSink, LuftdatenSink, Sink};
use enviro::http::{http_route, RequestContext};
use enviro::logging;
use enviro::metrics::{EnviroMetrics, MetricsExposition};
use enviro::poll::{run_poller, Poller};
use enviro::sensor::{
    read_serial_number, BusReset, Compensator, CpuTemperature, EnviroBoard, EnviroSensors, I2cDetectReset, NopReset,
    SensorAccess, SimulatedCpu, SimulatedSensors, ThermalZone,
};
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use prometheus::process_collector::ProcessCollector;
use prometheus::Registry;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use std::{io, process};
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::watch;
use tokio::task::{self, JoinHandle};
use tracing::{Instrument, Level};

const DEFAULT_BIND_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_PORT: u16 = 8000;

/// Expose readings from Pimoroni Enviro and Enviro+ sensors as Prometheus metrics
///
/// Read temperature, pressure, humidity, and light from the sensors of an Enviro
/// board attached to the local machine, usually a Raspberry PI, and expose them as
/// Prometheus metrics. Gas and particulate readings are included for the Enviro+.
///
/// Readings can optionally be posted to InfluxDB and Luftdaten as well. Each of
/// these runs on its own schedule and failures to post are logged and retried
/// at the next scheduled time.
#[derive(Debug, Parser)]
#[clap(name = "enviro-exporter", version = clap::crate_version!())]
struct ExporterApplication {
    /// Address to bind to. By default, the exporter will bind to a public address
    /// since the purpose is to expose metrics to an external system
    #[clap(short = 'b', long, default_value_t = DEFAULT_BIND_ADDR)]
    bind: IpAddr,

    /// Port to listen on
    #[clap(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[clap(flatten)]
    sensors: SensorArgs,

    /// Post sensor data to InfluxDB
    #[clap(short = 'i', long, action = ArgAction::Set, value_parser = parse_bool, default_value = "false")]
    influxdb: bool,

    #[clap(flatten)]
    influx: InfluxArgs,

    /// Post sensor data to Luftdaten
    #[clap(short = 'l', long, action = ArgAction::Set, value_parser = parse_bool, default_value = "false")]
    luftdaten: bool,

    #[clap(flatten)]
    luftdaten_opts: LuftdatenArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = ExporterApplication::parse();
    if let Err(e) = logging::init(opts.sensors.log_level(), &opts.sensors.log_file) {
        eprintln!("enviro-exporter: {}", e);
        process::exit(1);
    }

    let startup = Instant::now();

    // Validate everything needed for forwarding before touching any hardware.
    let influx = if opts.influxdb {
        Some(opts.influx.config().unwrap_or_else(|e| {
            tracing::error!(message = "invalid InfluxDB configuration", error = %e);
            process::exit(1)
        }))
    } else {
        None
    };

    let luftdaten_id = if opts.luftdaten {
        match read_serial_number(&opts.luftdaten_opts.cpuinfo) {
            Ok(Some(serial)) => Some(sensor_id(&serial)),
            Ok(None) => {
                tracing::error!(
                    message = "no serial number found for Luftdaten sensor ID",
                    path = %opts.luftdaten_opts.cpuinfo.display(),
                );
                process::exit(1)
            }
            Err(e) => {
                tracing::error!(
                    message = "unable to read serial number for Luftdaten sensor ID",
                    path = %opts.luftdaten_opts.cpuinfo.display(),
                    error = %e,
                );
                process::exit(1)
            }
        }
    } else {
        None
    };

    let registry = Registry::new();
    let metrics = EnviroMetrics::new(&registry).unwrap_or_else(|e| {
        tracing::error!(message = "failed to register sensor metrics", error = %e);
        process::exit(1)
    });

    registry
        .register(Box::new(ProcessCollector::for_self()))
        .unwrap_or_else(|e| {
            tracing::error!(message = "failed to register process metrics", error = %e);
            process::exit(1)
        });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    if opts.sensors.simulate {
        tracing::info!("using simulated sensors");
        tasks.push(start_poller(
            SimulatedSensors::new(),
            NopReset,
            SimulatedCpu,
            &opts.sensors,
            &metrics,
            shutdown_rx.clone(),
        ));
    } else {
        let board = EnviroBoard::open(&opts.sensors.board_config()).unwrap_or_else(|e| {
            tracing::error!(message = "failed to initialize sensors", error = %e);
            process::exit(1)
        });

        tasks.push(start_poller(
            board,
            I2cDetectReset::new(opts.sensors.i2c_bus),
            ThermalZone::new(opts.sensors.thermal_zone.clone()),
            &opts.sensors,
            &metrics,
            shutdown_rx.clone(),
        ));
    }

    if influx.is_some() || luftdaten_id.is_some() {
        let client = http_client().unwrap_or_else(|e| {
            tracing::error!(message = "failed to create HTTP client", error = %e);
            process::exit(1)
        });

        if let Some(config) = influx {
            let period = config.period;
            let sink = InfluxSink::new(client.clone(), config);
            tasks.push(start_forwarder(sink, &metrics, period, shutdown_rx.clone()));
        }

        if let Some(id) = luftdaten_id {
            tracing::info!(message = "posting to Luftdaten", sensor_id = %id);
            let sink = LuftdatenSink::new(client, opts.luftdaten_opts.url.clone(), id);
            tasks.push(start_forwarder(
                sink,
                &metrics,
                opts.luftdaten_opts.period(),
                shutdown_rx.clone(),
            ));
        }
    }

    let context = Arc::new(RequestContext::new(MetricsExposition::new(registry)));
    let service = make_service_fn(move |_| {
        let context = context.clone();

        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                http_route(req, context.clone()).instrument(tracing::span!(Level::DEBUG, "enviro_request"))
            }))
        }
    });

    let addr = SocketAddr::new(opts.bind, opts.port);
    let server = Server::try_bind(&addr).unwrap_or_else(|e| {
        tracing::error!(message = "error starting server", address = %addr, error = %e);
        process::exit(1)
    });

    tracing::info!(message = "server started", address = %addr);

    server
        .serve(service)
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    let _ = shutdown_tx.send(true);
    for t in tasks {
        if let Err(e) = t.await {
            tracing::warn!(message = "background task failed during shutdown", error = %e);
        }
    }

    tracing::info!(message = "server shutdown", runtime_secs = %startup.elapsed().as_secs());
    Ok(())
}

/// Start polling sensors in the background, returning a handle to the task.
fn start_poller<S, R, C>(
    sensors: S,
    reset: R,
    cpu: C,
    opts: &SensorArgs,
    metrics: &EnviroMetrics,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
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
    let poller = Poller::new(access, compensator, metrics.clone(), opts.variant());

    task::spawn(run_poller(Arc::new(Mutex::new(poller)), opts.poll_interval(), shutdown))
}

fn start_forwarder<K>(
    sink: K,
    metrics: &EnviroMetrics,
    period: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    K: Sink + 'static,
{
    task::spawn(Forwarder::new(sink, metrics.clone(), period).run(shutdown))
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
