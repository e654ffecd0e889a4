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

use crate::metrics::{EnviroMetrics, Snapshot};
use futures_util::future::BoxFuture;
use reqwest::{Client, StatusCode};
use std::error::Error;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum ForwardError {
    Transport(&'static str, Box<dyn Error + Send + Sync + 'static>),
    Status(&'static str, StatusCode),
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardError::Transport(msg, ref e) => write!(f, "{}: {}", msg, e),
            ForwardError::Status(msg, status) => write!(f, "{}: {}", msg, status),
        }
    }
}

impl Error for ForwardError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ForwardError::Transport(_, ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Create an HTTP client shared by all sinks.
pub fn http_client() -> Result<Client, ForwardError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ForwardError::Transport("unable to build HTTP client", Box::new(e)))
}

/// Somewhere sensor values can be sent to.
pub trait Sink: Send + Sync {
    /// Short name used for logging and the `sink` label of push metrics.
    fn name(&self) -> &'static str;

    fn push(&self, snapshot: Snapshot) -> BoxFuture<'_, Result<(), ForwardError>>;
}

/// Push the current values of all sensor metrics to a sink every `period`.
///
/// Failed pushes are logged and counted but otherwise ignored, the next push
/// happens after the usual period.
pub struct Forwarder<K> {
    sink: K,
    metrics: EnviroMetrics,
    period: Duration,
}

impl<K: Sink> Forwarder<K> {
    pub fn new(sink: K, metrics: EnviroMetrics, period: Duration) -> Self {
        Self { sink, metrics, period }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let name = self.sink.name();
        tracing::info!(message = "starting forwarder", sink = name, period_secs = self.period.as_secs_f64());

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.period) => {}
                _ = shutdown.changed() => break,
            }

            let snapshot = self.metrics.snapshot();
            match self.sink.push(snapshot).await {
                Ok(_) => {
                    tracing::debug!(message = "response: OK", sink = name);
                    self.metrics.pushed(name, true);
                }
                Err(e) => {
                    tracing::warn!(message = "failed to push sensor data", sink = name, error = %e);
                    self.metrics.pushed(name, false);
                }
            }
        }

        tracing::info!(message = "forwarder stopped", sink = name);
    }
}

/// Turn a response into an error unless it has a 2xx status.
pub(crate) async fn check_response(res: reqwest::Response, msg: &'static str) -> Result<(), ForwardError> {
    let status = res.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = res.text().await.unwrap_or_default();
        tracing::debug!(message = "unsuccessful response", status = %status, body = %body);
        Err(ForwardError::Status(msg, status))
    }
}

#[cfg(test)]
mod test {
    use super::{ForwardError, Forwarder, Sink};
    use crate::metrics::{EnviroMetrics, Snapshot};
    use crate::sensor::TemperatureCelsius;
    use futures_util::future::{self, BoxFuture};
    use prometheus::Registry;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::watch;

    /// Sink that fails the first `failures` pushes and records everything it's given.
    struct FlakySink {
        failures: usize,
        attempts: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<Snapshot>>>,
    }

    impl Sink for FlakySink {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn push(&self, snapshot: Snapshot) -> BoxFuture<'_, Result<(), ForwardError>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(snapshot);

            if attempt < self.failures {
                Box::pin(future::ready(Err(ForwardError::Status(
                    "unable to push",
                    StatusCode::SERVICE_UNAVAILABLE,
                ))))
            } else {
                Box::pin(future::ready(Ok(())))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwarder_retries_after_failure() {
        let metrics = EnviroMetrics::new(&Registry::new()).unwrap();
        metrics.set_temperature(TemperatureCelsius::from(19.5));

        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = FlakySink {
            failures: 2,
            attempts: attempts.clone(),
            seen: seen.clone(),
        };

        let (tx, rx) = watch::channel(false);
        let forwarder = Forwarder::new(sink, metrics.clone(), Duration::from_secs(5));
        let handle = tokio::spawn(forwarder.run(rx));

        tokio::time::sleep(Duration::from_secs(16)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(3, attempts.load(Ordering::SeqCst));
        assert_eq!(2, metrics.pushes("flaky", false));
        assert_eq!(1, metrics.pushes("flaky", true));
        assert!(seen.lock().unwrap().iter().all(|s| s.temperature == 19.5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwarder_stops_before_first_push() {
        let metrics = EnviroMetrics::new(&Registry::new()).unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let sink = FlakySink {
            failures: 0,
            attempts: attempts.clone(),
            seen: Arc::new(Mutex::new(Vec::new())),
        };

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Forwarder::new(sink, metrics, Duration::from_secs(30)).run(rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(0, attempts.load(Ordering::SeqCst));
    }
}
