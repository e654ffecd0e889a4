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

//! Command line and environment configuration shared by the binaries.

use crate::forward::LUFTDATEN_ENDPOINT;
use crate::poll::Variant;
use crate::sensor::{BoardConfig, DEFAULT_CPUINFO, DEFAULT_I2C_BUS, DEFAULT_SERIAL_PATH, DEFAULT_THERMAL_ZONE};
use clap::{ArgAction, Args};
use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_LOG_FILE: &str = "enviroplus_exporter.log";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_INFLUXDB_LOCATION: &str = "Adelaide";
pub const DEFAULT_INFLUXDB_SECS: u64 = 5;
pub const DEFAULT_LUFTDATEN_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidBool(String),
    Missing(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidBool(v) => write!(f, "boolean value expected, got '{}'", v),
            ConfigError::Missing(name) => write!(f, "{} must be set", name),
        }
    }
}

impl Error for ConfigError {}

/// Parse a boolean the way people tend to type them on a command line.
///
/// Accepts `true`, `t`, `1`, `yes`, `y` and `false`, `f`, `0`, `no`, `n`, ignoring case.
pub fn parse_bool(v: &str) -> Result<bool, ConfigError> {
    match v.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err(ConfigError::InvalidBool(v.to_owned())),
    }
}

/// Options for reading the sensors, used by every binary.
#[derive(Debug, Clone, Args)]
pub struct SensorArgs {
    /// The compensation factor to get better temperature results when the board is
    /// mounted close to the Raspberry PI. Zero disables compensation
    #[clap(short = 'f', long, env = "ENVIROPLUS_FACTOR", default_value_t = 0.0)]
    pub factor: f64,

    /// Device is an Enviro (not Enviro+) so don't fetch data from the gas and
    /// particulate sensors as they don't exist
    #[clap(short = 'e', long, action = ArgAction::Set, value_parser = parse_bool, default_value = "false")]
    pub enviro: bool,

    /// Turn on more verbose logging, showing sensor output and post responses
    #[clap(short = 'd', long, env = "DEBUG", action = ArgAction::Set, value_parser = parse_bool, default_value = "false")]
    pub debug: bool,

    /// Read the sensors at this interval, in milliseconds
    #[clap(long, default_value_t = DEFAULT_POLL_INTERVAL_MS, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: u64,

    /// Append log output to this file in addition to standard output
    #[clap(long, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Generate readings instead of talking to sensor hardware
    #[clap(long)]
    pub simulate: bool,

    /// I2C bus number the board is attached to
    #[clap(long, default_value_t = DEFAULT_I2C_BUS)]
    pub i2c_bus: u8,

    /// Serial port the particulate sensor is attached to
    #[clap(long, default_value = DEFAULT_SERIAL_PATH)]
    pub serial_port: PathBuf,

    /// File to read the CPU temperature from, in millidegrees celsius
    #[clap(long, default_value = DEFAULT_THERMAL_ZONE)]
    pub thermal_zone: PathBuf,
}

impl SensorArgs {
    pub fn variant(&self) -> Variant {
        Variant::from_enviro_flag(self.enviro)
    }

    pub fn log_level(&self) -> Level {
        if self.debug {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn board_config(&self) -> BoardConfig {
        BoardConfig {
            i2c_bus: self.i2c_bus,
            plus: self.variant().has_air_quality(),
            serial_path: self.serial_port.clone(),
        }
    }
}

/// InfluxDB connection settings, only used when posting to InfluxDB is enabled.
#[derive(Debug, Clone, Args)]
pub struct InfluxArgs {
    /// InfluxDB server to post to, e.g. https://example.com:8086
    #[clap(long = "influxdb-url", env = "INFLUXDB_URL", default_value = "", hide_env_values = true)]
    pub url: String,

    /// InfluxDB API token with write access to the bucket
    #[clap(long = "influxdb-token", env = "INFLUXDB_TOKEN", default_value = "", hide_env_values = true)]
    pub token: String,

    /// InfluxDB organization ID
    #[clap(long = "influxdb-org-id", env = "INFLUXDB_ORG_ID", default_value = "")]
    pub org_id: String,

    /// InfluxDB bucket to write to
    #[clap(long = "influxdb-bucket", env = "INFLUXDB_BUCKET", default_value = "")]
    pub bucket: String,

    /// Value of the location tag added to every point
    #[clap(long = "influxdb-sensor-location", env = "INFLUXDB_SENSOR_LOCATION", default_value = DEFAULT_INFLUXDB_LOCATION)]
    pub location: String,

    /// Seconds between posts to InfluxDB
    #[clap(long = "influxdb-time-between-posts", env = "INFLUXDB_TIME_BETWEEN_POSTS", default_value_t = DEFAULT_INFLUXDB_SECS)]
    pub time_between_posts: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org_id: String,
    pub bucket: String,
    pub location: String,
    pub period: Duration,
}

impl InfluxArgs {
    /// Validate the settings, returning an error if anything required to post is missing.
    pub fn config(&self) -> Result<InfluxConfig, ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Missing("INFLUXDB_URL"));
        }

        if self.bucket.is_empty() {
            return Err(ConfigError::Missing("INFLUXDB_BUCKET"));
        }

        Ok(InfluxConfig {
            url: self.url.trim_end_matches('/').to_owned(),
            token: self.token.clone(),
            org_id: self.org_id.clone(),
            bucket: self.bucket.clone(),
            location: self.location.clone(),
            period: Duration::from_secs(self.time_between_posts),
        })
    }
}

/// Luftdaten settings, only used when posting to Luftdaten is enabled.
#[derive(Debug, Clone, Args)]
pub struct LuftdatenArgs {
    /// Seconds between posts to Luftdaten
    #[clap(long = "luftdaten-time-between-posts", env = "LUFTDATEN_TIME_BETWEEN_POSTS", default_value_t = DEFAULT_LUFTDATEN_SECS)]
    pub time_between_posts: u64,

    /// Luftdaten sensor data API endpoint
    #[clap(long = "luftdaten-url", default_value = LUFTDATEN_ENDPOINT)]
    pub url: String,

    /// File to read the Raspberry PI serial number from, used to identify the sensor
    #[clap(long, default_value = DEFAULT_CPUINFO)]
    pub cpuinfo: PathBuf,
}

impl LuftdatenArgs {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.time_between_posts)
    }
}

#[cfg(test)]
mod test {
    use super::{parse_bool, ConfigError, InfluxArgs, SensorArgs};
    use crate::poll::Variant;
    use clap::Parser;
    use std::time::Duration;
    use tracing::Level;

    #[derive(Debug, Parser)]
    struct TestApplication {
        #[clap(flatten)]
        sensors: SensorArgs,

        #[clap(flatten)]
        influx: InfluxArgs,
    }

    #[test]
    fn test_parse_bool_true() {
        for v in ["true", "T", "1", "yes", "Y", "True"] {
            assert_eq!(Ok(true), parse_bool(v), "value {}", v);
        }
    }

    #[test]
    fn test_parse_bool_false() {
        for v in ["false", "F", "0", "no", "N", "FALSE"] {
            assert_eq!(Ok(false), parse_bool(v), "value {}", v);
        }
    }

    #[test]
    fn test_parse_bool_invalid() {
        assert_eq!(Err(ConfigError::InvalidBool("maybe".to_owned())), parse_bool("maybe"));
        assert!(parse_bool("").is_err());
    }

    #[test]
    fn test_sensor_args_short_flags() {
        let app = TestApplication::try_parse_from(["test", "-e", "yes", "-d", "1", "-f", "2.25"]).unwrap();

        assert_eq!(Variant::Enviro, app.sensors.variant());
        assert_eq!(Level::DEBUG, app.sensors.log_level());
        assert_eq!(2.25, app.sensors.factor);
        assert!(!app.sensors.board_config().plus);
    }

    #[test]
    fn test_sensor_args_invalid_bool() {
        assert!(TestApplication::try_parse_from(["test", "--enviro", "sometimes"]).is_err());
    }

    #[test]
    fn test_sensor_args_debug_rejects_unknown_value() {
        assert!(TestApplication::try_parse_from(["test", "--debug", "verbose"]).is_err());

        let app = TestApplication::try_parse_from(["test", "--debug", "TRUE"]).unwrap();
        assert_eq!(Level::DEBUG, app.sensors.log_level());
    }

    #[test]
    fn test_sensor_args_poll_interval() {
        let app = TestApplication::try_parse_from(["test", "--poll-interval-ms", "250"]).unwrap();
        assert_eq!(Duration::from_millis(250), app.sensors.poll_interval());

        assert!(TestApplication::try_parse_from(["test", "--poll-interval-ms", "0"]).is_err());
    }

    #[test]
    fn test_influx_config_missing_url() {
        let app = TestApplication::try_parse_from(["test", "--influxdb-url", "", "--influxdb-bucket", "b"]).unwrap();
        assert_eq!(Err(ConfigError::Missing("INFLUXDB_URL")), app.influx.config());
    }

    #[test]
    fn test_influx_config() {
        let app = TestApplication::try_parse_from([
            "test",
            "--influxdb-url",
            "http://localhost:8086/",
            "--influxdb-bucket",
            "enviro",
            "--influxdb-sensor-location",
            "Kitchen",
            "--influxdb-time-between-posts",
            "10",
        ])
        .unwrap();

        let config = app.influx.config().unwrap();
        assert_eq!("http://localhost:8086", config.url);
        assert_eq!("enviro", config.bucket);
        assert_eq!("Kitchen", config.location);
        assert_eq!(Duration::from_secs(10), config.period);
    }
}
