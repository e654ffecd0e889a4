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

use std::error::Error;
use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[derive(Debug)]
pub enum LoggingError {
    LogFile(String, io::Error),
    Subscriber(tracing::subscriber::SetGlobalDefaultError),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingError::LogFile(path, e) => write!(f, "unable to open log file {}: {}", path, e),
            LoggingError::Subscriber(e) => write!(f, "unable to set tracing subscriber: {}", e),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoggingError::LogFile(_, e) => Some(e),
            LoggingError::Subscriber(e) => Some(e),
        }
    }
}

/// Install a global subscriber that writes every event to standard output and
/// appends it to `log_file` as well.
pub fn init(level: Level, log_file: &Path) -> Result<(), LoggingError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| LoggingError::LogFile(log_file.display().to_string(), e))?;

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(io::stdout.and(Mutex::new(file)))
        .finish();

    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::Subscriber)
}

#[cfg(test)]
mod test {
    use super::{init, LoggingError};
    use std::path::Path;
    use tracing::Level;

    #[test]
    fn test_init_unwritable_log_file() {
        let res = init(Level::INFO, Path::new("/nonexistent-enviro-dir/enviroplus_exporter.log"));
        assert!(matches!(res, Err(LoggingError::LogFile(_, _))));
    }
}
