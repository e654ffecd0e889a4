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

use crate::sensor::core::{ParticulateReading, SensorError, SensorErrorKind};
use rppal::uart::Uart;
use std::time::{Duration, Instant};

pub(crate) const FRAME_SIZE: usize = 32;
pub(crate) const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

const START_1: u8 = 0x42;
const START_2: u8 = 0x4D;
// Two bytes per data word (13 of them) plus two bytes of checksum
const FRAME_LENGTH: u16 = 28;
const DATA_WORDS: usize = 13;

/// Abstraction around a serial port to allow for easier testing.
///
/// Implementations should return `Ok(0)` when no data arrives within a short
/// period rather than blocking indefinitely.
pub trait ByteSource {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, SensorError>;
}

impl ByteSource for Uart {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, SensorError> {
        self.read(buf)
            .map_err(|e| SensorError::KindMsgCause(SensorErrorKind::Bus, "unable to read from serial port", Box::new(e)))
    }
}

/// Parse a complete frame (including start characters and checksum) sent by
/// the PMS5003.
///
/// An error will be returned if the frame doesn't start with the expected
/// characters, has an unexpected length, or if the checksum included in the
/// frame indicates the data is corrupt.
pub(crate) fn parse_frame(frame: &[u8; FRAME_SIZE]) -> Result<ParticulateReading, SensorError> {
    if frame[0] != START_1 || frame[1] != START_2 {
        return Err(SensorError::KindMsg(
            SensorErrorKind::Checksum,
            "invalid start of PMS5003 frame",
        ));
    }

    if u16::from_be_bytes([frame[2], frame[3]]) != FRAME_LENGTH {
        return Err(SensorError::KindMsg(
            SensorErrorKind::Checksum,
            "unexpected PMS5003 frame length",
        ));
    }

    // The checksum is the sum of every byte before it, including the start characters
    let expected = u16::from_be_bytes([frame[FRAME_SIZE - 2], frame[FRAME_SIZE - 1]]);
    let computed = frame[..FRAME_SIZE - 2]
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(b as u16));

    if expected != computed {
        return Err(SensorError::CheckSum(expected, computed));
    }

    let mut words = [0u16; DATA_WORDS];
    for (i, word) in words.iter_mut().enumerate() {
        let offset = 4 + i * 2;
        *word = u16::from_be_bytes([frame[offset], frame[offset + 1]]);
    }

    // The final word is reserved
    Ok(ParticulateReading {
        pm1_standard: words[0],
        pm25_standard: words[1],
        pm10_standard: words[2],
        pm1_atmospheric: words[3],
        pm25_atmospheric: words[4],
        pm10_atmospheric: words[5],
        counts: [words[6], words[7], words[8], words[9], words[10], words[11]],
    })
}

/// Plantower PMS5003 particulate sensor, connected via serial.
///
/// The sensor continuously sends frames once it has been enabled. Reading
/// synchronizes on the start characters of the next frame and then reads the
/// rest of it.
#[derive(Debug)]
pub(crate) struct Pms5003<S> {
    source: S,
    timeout: Duration,
}

impl<S: ByteSource> Pms5003<S> {
    pub(crate) fn new(source: S, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub(crate) fn read(&mut self) -> Result<ParticulateReading, SensorError> {
        let deadline = Instant::now() + self.timeout;
        let mut frame = [0u8; FRAME_SIZE];

        let mut previous = 0u8;
        loop {
            let mut byte = [0u8; 1];
            if self.next(&mut byte, deadline)? == 0 {
                continue;
            }

            if previous == START_1 && byte[0] == START_2 {
                break;
            }

            previous = byte[0];
        }

        frame[0] = START_1;
        frame[1] = START_2;

        let mut filled = 2;
        while filled < FRAME_SIZE {
            filled += self.next(&mut frame[filled..], deadline)?;
        }

        tracing::trace!(message = "read PMS5003 frame", frame = ?frame);
        parse_frame(&frame)
    }

    fn next(&mut self, buf: &mut [u8], deadline: Instant) -> Result<usize, SensorError> {
        if Instant::now() >= deadline {
            return Err(SensorError::KindMsg(
                SensorErrorKind::ReadTimeout,
                "timeout waiting for PMS5003 frame",
            ));
        }

        self.source.read_bytes(buf)
    }
}

#[cfg(test)]
mod test {
    use super::{parse_frame, Pms5003, FRAME_SIZE};
    use crate::sensor::core::{SensorError, SensorErrorKind};
    use crate::sensor::test::{pms5003_frame, MockByteSource};
    use std::time::Duration;

    #[test]
    fn test_parse_frame_valid() {
        let frame = pms5003_frame([1, 2, 3, 4, 5, 6, 100, 50, 20, 10, 5, 1, 0]);
        let reading = parse_frame(&frame).unwrap();

        assert_eq!(1, reading.pm1_standard);
        assert_eq!(2, reading.pm25_standard);
        assert_eq!(3, reading.pm10_standard);
        assert_eq!(4, reading.pm1_atmospheric);
        assert_eq!(5, reading.pm25_atmospheric);
        assert_eq!(6, reading.pm10_atmospheric);
        assert_eq!([100, 50, 20, 10, 5, 1], reading.counts);
    }

    #[test]
    fn test_parse_frame_checksum_invalid() {
        let mut frame = pms5003_frame([1, 2, 3, 4, 5, 6, 0, 0, 0, 0, 0, 0, 0]);
        frame[FRAME_SIZE - 1] = frame[FRAME_SIZE - 1].wrapping_add(1);

        match parse_frame(&frame).unwrap_err() {
            SensorError::CheckSum(expected, got) => {
                assert_eq!(expected, got + 1);
            }
            e => panic!("Unexpected error: {}", e),
        }
    }

    #[test]
    fn test_parse_frame_bad_length() {
        let mut frame = pms5003_frame([0; 13]);
        frame[3] = 20;

        let res = parse_frame(&frame);
        assert_eq!(SensorErrorKind::Checksum, res.unwrap_err().kind());
    }

    #[test]
    fn test_read_skips_garbage() {
        let mut bytes = vec![0x00, 0x42, 0x11, 0x4D, 0x42];
        bytes.extend_from_slice(&pms5003_frame([7, 8, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]));

        let mut sensor = Pms5003::new(MockByteSource::new(bytes), Duration::from_secs(1));
        let reading = sensor.read().unwrap();

        assert_eq!(7, reading.pm1_standard);
        assert_eq!(8, reading.pm25_standard);
        assert_eq!(9, reading.pm10_standard);
    }

    #[test]
    fn test_read_timeout() {
        let mut sensor = Pms5003::new(MockByteSource::new(vec![0x42]), Duration::from_millis(20));
        let res = sensor.read();

        assert_eq!(SensorErrorKind::ReadTimeout, res.unwrap_err().kind());
    }

    #[test]
    fn test_read_truncated_frame_timeout() {
        let frame = pms5003_frame([1, 2, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let mut sensor = Pms5003::new(MockByteSource::new(frame[..10].to_vec()), Duration::from_millis(20));
        let res = sensor.read();

        assert_eq!(SensorErrorKind::ReadTimeout, res.unwrap_err().kind());
    }
}
