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

use crate::forward::core::{check_response, ForwardError, Sink};
use crate::metrics::Snapshot;
use futures_util::future::BoxFuture;
use reqwest::header::CACHE_CONTROL;
use reqwest::Client;
use serde::Serialize;

pub const LUFTDATEN_ENDPOINT: &str = "https://api.luftdaten.info/v1/push-sensor-data/";
pub const SOFTWARE_VERSION: &str = "enviro-plus 0.0.1";

const PARTICULATE_PIN: &str = "1";
const CLIMATE_PIN: &str = "11";

/// Luftdaten sensor ID for a Raspberry PI with the given serial number.
pub fn sensor_id(serial: &str) -> String {
    format!("raspi-{}", serial)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataValue {
    pub value_type: &'static str,
    pub value: Value,
}

/// Body of a single sensor data submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub software_version: &'static str,
    pub sensordatavalues: Vec<DataValue>,
}

impl Submission {
    fn new(values: Vec<DataValue>) -> Self {
        Self {
            software_version: SOFTWARE_VERSION,
            sensordatavalues: values,
        }
    }
}

/// Particulate matter values, submitted as the SDS011 sensor type (pin 1).
pub fn particulate_submission(snapshot: &Snapshot) -> Submission {
    Submission::new(vec![
        DataValue {
            value_type: "P2",
            value: Value::Number(snapshot.pm25),
        },
        DataValue {
            value_type: "P1",
            value: Value::Number(snapshot.pm10),
        },
    ])
}

/// Temperature, pressure (in Pa), and humidity, submitted as the BME280 sensor type (pin 11).
pub fn climate_submission(snapshot: &Snapshot) -> Submission {
    let formatted = |v: f64| Value::Text(format!("{:.2}", v));

    Submission::new(vec![
        DataValue {
            value_type: "temperature",
            value: formatted(snapshot.temperature),
        },
        DataValue {
            value_type: "pressure",
            value: formatted(snapshot.pressure * 100.0),
        },
        DataValue {
            value_type: "humidity",
            value: formatted(snapshot.humidity),
        },
    ])
}

/// Submit particulate and climate values to Luftdaten (sensor.community).
pub struct LuftdatenSink {
    client: Client,
    url: String,
    sensor_id: String,
}

impl LuftdatenSink {
    pub fn new(client: Client, url: String, sensor_id: String) -> Self {
        Self { client, url, sensor_id }
    }

    async fn submit(&self, pin: &'static str, submission: &Submission) -> Result<(), ForwardError> {
        let res = self
            .client
            .post(&self.url)
            .header("X-PIN", pin)
            .header("X-Sensor", &self.sensor_id)
            .header(CACHE_CONTROL, "no-cache")
            .json(submission)
            .send()
            .await
            .map_err(|e| ForwardError::Transport("unable to post to Luftdaten", Box::new(e)))?;

        check_response(res, "Luftdaten post rejected").await
    }

    async fn submit_all(&self, snapshot: Snapshot) -> Result<(), ForwardError> {
        // Both are always attempted, the first error wins
        let particulates = self.submit(PARTICULATE_PIN, &particulate_submission(&snapshot)).await;
        let climate = self.submit(CLIMATE_PIN, &climate_submission(&snapshot)).await;
        particulates.and(climate)
    }
}

impl Sink for LuftdatenSink {
    fn name(&self) -> &'static str {
        "luftdaten"
    }

    fn push(&self, snapshot: Snapshot) -> BoxFuture<'_, Result<(), ForwardError>> {
        Box::pin(self.submit_all(snapshot))
    }
}
