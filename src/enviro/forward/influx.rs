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

use crate::config::InfluxConfig;
use crate::forward::core::{check_response, ForwardError, Sink};
use crate::metrics::Snapshot;
use futures_util::future::BoxFuture;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::fmt::Write;
use std::time::{SystemTime, UNIX_EPOCH};

pub const MEASUREMENT: &str = "enviroplus";

fn escape_measurement(v: &str) -> String {
    v.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_key(v: &str) -> String {
    v.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

/// Render a snapshot as InfluxDB line protocol, one point per field.
///
/// Each point is the `enviroplus` measurement tagged with the location and has a
/// single field named after the value. Non-finite values can't be represented in
/// line protocol and are skipped.
pub fn line_protocol(location: &str, snapshot: &Snapshot, timestamp_secs: u64) -> String {
    let measurement = escape_measurement(MEASUREMENT);
    let location = escape_key(location);
    let mut out = String::new();

    for (name, value) in snapshot.fields() {
        if !value.is_finite() {
            tracing::debug!(message = "skipping non-finite value", field = name, value = value);
            continue;
        }

        // Writing to a String can't fail
        let _ = writeln!(
            out,
            "{},location={} {}={} {}",
            measurement,
            location,
            escape_key(name),
            value,
            timestamp_secs
        );
    }

    out
}

/// Write sensor values to the InfluxDB v2 write API.
pub struct InfluxSink {
    client: Client,
    config: InfluxConfig,
}

impl InfluxSink {
    pub fn new(client: Client, config: InfluxConfig) -> Self {
        Self { client, config }
    }

    async fn write(&self, snapshot: Snapshot) -> Result<(), ForwardError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let body = line_protocol(&self.config.location, &snapshot, now);
        let res = self
            .client
            .post(format!("{}/api/v2/write", self.config.url))
            .query(&[
                ("org", self.config.org_id.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "s"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.config.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| ForwardError::Transport("unable to write to InfluxDB", Box::new(e)))?;

        check_response(res, "InfluxDB write rejected").await
    }
}

impl Sink for InfluxSink {
    fn name(&self) -> &'static str {
        "influxdb"
    }

    fn push(&self, snapshot: Snapshot) -> BoxFuture<'_, Result<(), ForwardError>> {
        Box::pin(self.write(snapshot))
    }
}

#[cfg(test)]
mod test {
    use super::{line_protocol, InfluxSink};
    use crate::config::InfluxConfig;
    use crate::forward::core::{ForwardError, Sink};
    use crate::forward::test::RecordingServer;
    use crate::metrics::Snapshot;
    use reqwest::{Client, StatusCode};
    use std::time::Duration;

    fn snapshot() -> Snapshot {
        Snapshot {
            temperature: 21.5,
            humidity: 40.0,
            pressure: 1012.25,
            pm25: 7.0,
            ..Default::default()
        }
    }

    fn config(url: &str) -> InfluxConfig {
        InfluxConfig {
            url: url.to_owned(),
            token: "s3cr3t".to_owned(),
            org_id: "org1".to_owned(),
            bucket: "sensors".to_owned(),
            location: "Adelaide".to_owned(),
            period: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_line_protocol_point_per_field() {
        let lines = line_protocol("Adelaide", &snapshot(), 1650000000);
        let lines: Vec<&str> = lines.lines().collect();

        assert_eq!(11, lines.len());
        assert_eq!("enviroplus,location=Adelaide temperature=21.5 1650000000", lines[0]);
        assert_eq!("enviroplus,location=Adelaide humidity=40 1650000000", lines[1]);
        assert_eq!("enviroplus,location=Adelaide pressure=1012.25 1650000000", lines[2]);
        assert_eq!("enviroplus,location=Adelaide pm25=7 1650000000", lines[9]);
    }

    #[test]
    fn test_line_protocol_escapes_tag_value() {
        let lines = line_protocol("Living room, upstairs=1", &Snapshot::default(), 1);
        assert!(lines.starts_with("enviroplus,location=Living\\ room\\,\\ upstairs\\=1 temperature=0 1\n"));
    }

    #[test]
    fn test_line_protocol_skips_non_finite() {
        let s = Snapshot {
            lux: f64::NAN,
            ..Default::default()
        };

        let lines = line_protocol("Adelaide", &s, 1);
        assert_eq!(10, lines.lines().count());
        assert!(!lines.contains("lux="));
    }

    #[tokio::test]
    async fn test_push_success() {
        let server = RecordingServer::start(StatusCode::NO_CONTENT);
        let sink = InfluxSink::new(Client::new(), config(&server.url));

        sink.push(snapshot()).await.unwrap();

        let requests = server.requests();
        assert_eq!(1, requests.len());
        assert_eq!("POST", requests[0].method);
        assert_eq!("/api/v2/write?org=org1&bucket=sensors&precision=s", requests[0].uri);
        assert_eq!("Token s3cr3t", requests[0].headers["authorization"].to_str().unwrap());
        assert!(requests[0].body.contains("enviroplus,location=Adelaide temperature=21.5 "));
    }

    #[tokio::test]
    async fn test_push_rejected() {
        let server = RecordingServer::start(StatusCode::UNAUTHORIZED);
        let sink = InfluxSink::new(Client::new(), config(&server.url));

        match sink.push(snapshot()).await {
            Err(ForwardError::Status(_, status)) => assert_eq!(StatusCode::UNAUTHORIZED, status),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
