/**
 * Telemetry frame parsing
 *
 * The inertial board prints one block per sample:
 *
 *   time: 12345 ms
 *   accel_x: 0.123, accel_y: 0.456, accel_z: 9.810
 *   gyro_x: 0.001, gyro_y: 0.002, gyro_z: 0.003
 *   temp_c: 25.50
 *   ---
 *
 * Lines are fed one at a time into a FrameAssembler. A sample is only
 * produced at the sentinel, and only if every field was seen since the
 * frame was opened.
 */

use crate::error::{Error, Result};

pub const FRAME_SENTINEL: &str = "---";

/// Longest line the reader keeps before discarding it as noise
pub const MAX_LINE_LEN: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One complete telemetry block
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InertialSample {
    /// Board-side millisecond counter
    pub timestamp_ms: u64,
    pub accel: Vector3, //m/s²
    pub gyro: Vector3,  //rad/s
    pub temperature: f32, //°C
}

/// A single recognised telemetry line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryLine {
    Time(u64),
    Accel(Vector3),
    Gyro(Vector3),
    Temperature(f32),
    Sentinel,
}

impl TelemetryLine {
    /// Parse one line (without its newline). Unrecognised or malformed lines
    /// are errors; the caller skips them.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line == FRAME_SENTINEL {
            return Ok(TelemetryLine::Sentinel);
        }

        let (key, _) = line
            .split_once(':')
            .ok_or_else(|| Error::Telemetry(format!("no key in line {:?}", line)))?;

        match key.trim() {
            "time" => {
                let value = field_value(line, "time")?;
                let value = value.trim_end_matches("ms").trim();
                value
                    .parse::<u64>()
                    .map(TelemetryLine::Time)
                    .map_err(|_| Error::Telemetry(format!("bad time value {:?}", value)))
            }
            "accel_x" => parse_triple(line, ["accel_x", "accel_y", "accel_z"]).map(TelemetryLine::Accel),
            "gyro_x" => parse_triple(line, ["gyro_x", "gyro_y", "gyro_z"]).map(TelemetryLine::Gyro),
            "temp_c" => parse_number(field_value(line, "temp_c")?).map(TelemetryLine::Temperature),
            other => Err(Error::Telemetry(format!("unknown key {:?}", other))),
        }
    }
}

//value of a single `key: value` line
fn field_value<'a>(line: &'a str, key: &str) -> Result<&'a str> {
    let (k, v) = line
        .split_once(':')
        .ok_or_else(|| Error::Telemetry(format!("missing {}", key)))?;
    if k.trim() != key {
        return Err(Error::Telemetry(format!("expected {}, got {:?}", key, k.trim())));
    }
    Ok(v.trim())
}

fn parse_number(value: &str) -> Result<f32> {
    let value = value.trim();
    match value.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(Error::Telemetry(format!("bad number {:?}", value))),
    }
}

//`a: 1, b: 2, c: 3` with keys in this exact order
fn parse_triple(line: &str, keys: [&str; 3]) -> Result<Vector3> {
    let mut parts = line.split(',');
    let mut values = [0.0f32; 3];

    for (slot, key) in values.iter_mut().zip(keys) {
        let part = parts
            .next()
            .ok_or_else(|| Error::Telemetry(format!("missing {}", key)))?;
        *slot = parse_number(field_value(part, key)?)?;
    }

    if parts.next().is_some() {
        return Err(Error::Telemetry(format!("trailing fields in {:?}", line)));
    }

    Ok(Vector3 {
        x: values[0],
        y: values[1],
        z: values[2],
    })
}

/// Fields observed since the frame was opened
#[derive(Debug, Default)]
struct PartialSample {
    timestamp_ms: Option<u64>,
    accel: Option<Vector3>,
    gyro: Option<Vector3>,
    temperature: Option<f32>,
}

impl PartialSample {
    fn is_empty(&self) -> bool {
        self.timestamp_ms.is_none()
            && self.accel.is_none()
            && self.gyro.is_none()
            && self.temperature.is_none()
    }

    /// Complete only when every field is present
    fn complete(&self) -> Option<InertialSample> {
        Some(InertialSample {
            timestamp_ms: self.timestamp_ms?,
            accel: self.accel?,
            gyro: self.gyro?,
            temperature: self.temperature?,
        })
    }
}

/// Outcome of feeding one line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameEvent {
    /// Line absorbed, frame still open
    Pending,
    /// Sentinel reached with every field present
    Complete(InertialSample),
    /// Sentinel reached (or frame restarted) with fields missing
    Discarded,
}

/// Accumulates telemetry lines into complete samples
#[derive(Debug, Default)]
pub struct FrameAssembler {
    scratch: PartialSample,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw line. Malformed lines are returned as errors and leave
    /// the open frame untouched.
    pub fn feed(&mut self, line: &str) -> Result<FrameEvent> {
        let parsed = TelemetryLine::parse(line)?;
        Ok(self.apply(parsed))
    }

    pub fn apply(&mut self, line: TelemetryLine) -> FrameEvent {
        match line {
            TelemetryLine::Time(t) => {
                //a time line opens a new frame; leftovers of a frame whose
                //sentinel was lost must not leak into this one
                let restarted = !self.scratch.is_empty();
                self.scratch = PartialSample {
                    timestamp_ms: Some(t),
                    ..PartialSample::default()
                };
                if restarted {
                    return FrameEvent::Discarded;
                }
            }
            TelemetryLine::Accel(v) => self.scratch.accel = Some(v),
            TelemetryLine::Gyro(v) => self.scratch.gyro = Some(v),
            TelemetryLine::Temperature(t) => self.scratch.temperature = Some(t),
            TelemetryLine::Sentinel => {
                let scratch = std::mem::take(&mut self.scratch);
                return match scratch.complete() {
                    Some(sample) => FrameEvent::Complete(sample),
                    None => FrameEvent::Discarded,
                };
            }
        }
        FrameEvent::Pending
    }
}

/// Splits a byte stream into text lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line they complete, without the
    /// terminator. Invalid UTF-8 is replaced, over-long lines are dropped.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in data {
            match byte {
                b'\n' => {
                    let line = String::from_utf8_lossy(&self.pending)
                        .trim_end_matches('\r')
                        .to_string();
                    self.pending.clear();
                    if !line.trim().is_empty() {
                        lines.push(line);
                    }
                }
                _ if self.pending.len() >= MAX_LINE_LEN => {
                    log::debug!("Dropping over-long telemetry line");
                    self.pending.clear();
                }
                _ => self.pending.push(byte),
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(assembler: &mut FrameAssembler, lines: &[&str]) -> Vec<FrameEvent> {
        lines
            .iter()
            .filter_map(|l| assembler.feed(l).ok())
            .collect()
    }

    #[test]
    fn test_parse_lines() {
        assert_eq!(TelemetryLine::parse("time: 12345 ms").unwrap(), TelemetryLine::Time(12345));
        assert_eq!(
            TelemetryLine::parse("accel_x: 0.123, accel_y: -0.456, accel_z: 9.810").unwrap(),
            TelemetryLine::Accel(Vector3 { x: 0.123, y: -0.456, z: 9.81 })
        );
        assert_eq!(
            TelemetryLine::parse("gyro_x:-1,gyro_y:2.5,gyro_z:-.25").unwrap(),
            TelemetryLine::Gyro(Vector3 { x: -1.0, y: 2.5, z: -0.25 })
        );
        assert_eq!(TelemetryLine::parse("temp_c: 25.50").unwrap(), TelemetryLine::Temperature(25.5));
        assert_eq!(TelemetryLine::parse(" --- ").unwrap(), TelemetryLine::Sentinel);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(TelemetryLine::parse("hello").is_err());
        assert!(TelemetryLine::parse("time: soon ms").is_err());
        assert!(TelemetryLine::parse("accel_x: 1.0, accel_y: 2.0").is_err());
        assert!(TelemetryLine::parse("gyro_x: 1, gyro_z: 2, gyro_y: 3").is_err());
        assert!(TelemetryLine::parse("gyro_x: 1, gyro_y: 2, gyro_z: nan").is_err());
        assert!(TelemetryLine::parse("mag_x: 1").is_err());
    }

    #[test]
    fn test_complete_frame() {
        let mut assembler = FrameAssembler::new();
        let events = feed_all(
            &mut assembler,
            &[
                "time: 100 ms",
                "accel_x: 0.1, accel_y: 0.2, accel_z: 9.8",
                "gyro_x: 0.0, gyro_y: 0.0, gyro_z: 0.05",
                "temp_c: 30.0",
                "---",
            ],
        );
        let last = events.last().copied().unwrap();
        match last {
            FrameEvent::Complete(sample) => {
                assert_eq!(sample.timestamp_ms, 100);
                assert_eq!(sample.gyro.z, 0.05);
                assert_eq!(sample.temperature, 30.0);
            }
            other => panic!("expected complete frame, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_frame_discarded() {
        let mut assembler = FrameAssembler::new();
        let events = feed_all(
            &mut assembler,
            &["time: 100 ms", "gyro_x: 0, gyro_y: 0, gyro_z: 1", "---"],
        );
        assert_eq!(events.last(), Some(&FrameEvent::Discarded));

        //accumulation restarts cleanly after a discard
        let events = feed_all(
            &mut assembler,
            &["accel_x: 0, accel_y: 0, accel_z: 0", "temp_c: 20", "---"],
        );
        assert_eq!(events.last(), Some(&FrameEvent::Discarded));
    }

    #[test]
    fn test_time_line_restarts_frame() {
        let mut assembler = FrameAssembler::new();
        let events = feed_all(
            &mut assembler,
            &[
                "time: 1 ms",
                "accel_x: 0, accel_y: 0, accel_z: 0",
                "gyro_x: 0, gyro_y: 0, gyro_z: 9",
                //sentinel lost here
                "time: 2 ms",
                "accel_x: 1, accel_y: 1, accel_z: 1",
                "temp_c: 21",
                "---",
            ],
        );
        assert!(events.contains(&FrameEvent::Discarded));
        //gyro of the first frame must not complete the second
        assert_eq!(events.last(), Some(&FrameEvent::Discarded));
    }

    #[test]
    fn test_malformed_line_keeps_frame() {
        let mut assembler = FrameAssembler::new();
        assembler.feed("time: 5 ms").unwrap();
        assert!(assembler.feed("accel_x: garbage").is_err());
        assembler.feed("accel_x: 0, accel_y: 0, accel_z: 0").unwrap();
        assembler.feed("gyro_x: 0, gyro_y: 0, gyro_z: 0").unwrap();
        assembler.feed("temp_c: 20").unwrap();
        assert!(matches!(assembler.feed("---").unwrap(), FrameEvent::Complete(_)));
    }

    #[test]
    fn test_line_buffer_splits_chunks() {
        let mut lines = LineBuffer::new();
        assert!(lines.push(b"time: 1").is_empty());
        assert_eq!(lines.push(b"0 ms\r\n---\n\n"), vec!["time: 10 ms".to_string(), "---".to_string()]);
    }

    #[test]
    fn test_line_buffer_drops_overlong() {
        let mut lines = LineBuffer::new();
        let noise = vec![b'x'; MAX_LINE_LEN + 10];
        lines.push(&noise);
        let out = lines.push(b"\n---\n");
        assert_eq!(out.last().map(String::as_str), Some("---"));
        assert!(out.iter().all(|l| l.len() <= MAX_LINE_LEN));
    }
}
