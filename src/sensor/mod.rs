/**
 * Sensor Link
 *
 * Owns the serial connection to the inertial board:
 * 1. Background reader thread splits the byte stream into lines
 * 2. Lines are assembled into complete telemetry frames
 * 3. Each complete frame is committed atomically: sample, heading, drift
 * 4. Readers get copies, never a partially updated state
 */

pub mod heading;
pub mod telemetry;

pub use heading::{normalize_angle, BiasFilter, DriftHistory, HeadingState};
pub use telemetry::{FrameAssembler, FrameEvent, InertialSample, LineBuffer, TelemetryLine, Vector3};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::{DriftSource, SensorConfig, SerialConfig};
use crate::control::HeadingSource;
use crate::error::{Error, Result};
use crate::threads::join_with_timeout;
use crate::transport::{SerialTransport, Transport};

/// Everything the reader publishes, guarded by one lock
#[derive(Debug)]
struct SensorState {
    sample: Option<InertialSample>,
    heading: HeadingState,
    drift: DriftHistory,
    bias: BiasFilter,
    last_frame_at: Option<Instant>,
    frames_committed: u64,
    frames_discarded: u64,
    read_errors: u64,
}

/// Read-only copy of the sensor state
#[derive(Debug, Clone, Copy)]
pub struct SensorSnapshot {
    pub sample: Option<InertialSample>,
    pub heading: f32,
    pub drift_rate: f32,
    pub last_frame_at: Option<Instant>,
    pub frames_committed: u64,
    pub frames_discarded: u64,
    pub read_errors: u64,
}

impl SensorSnapshot {
    /// Time since the frame this copy was taken from, `None` if there never was one
    pub fn frame_age(&self, now: Instant) -> Option<Duration> {
        self.last_frame_at.map(|t| now.saturating_duration_since(t))
    }
}

/// Shared state between the reader thread and its consumers
#[derive(Debug)]
pub struct SensorShared {
    state: Mutex<SensorState>,
    drift_source: DriftSource,
    stale_after: Duration,
}

impl SensorShared {
    pub fn new(config: &SensorConfig) -> Self {
        Self {
            state: Mutex::new(SensorState {
                sample: None,
                heading: HeadingState::default(),
                drift: DriftHistory::new(config.drift_window.max(1)),
                bias: BiasFilter::new(config.bias_alpha, config.bias_accel_threshold),
                last_frame_at: None,
                frames_committed: 0,
                frames_discarded: 0,
                read_errors: 0,
            }),
            drift_source: config.drift_source,
            stale_after: config.stale_after(),
        }
    }

    /// Publish a complete sample and integrate heading up to `now`
    pub fn commit(&self, sample: InertialSample, now: Instant) {
        let mut state = self.state.lock();
        state.heading.integrate(sample.gyro.z, now);
        state.drift.push(sample.gyro.z);
        state.bias.update(sample.gyro.z, sample.accel.x, sample.accel.y);
        state.sample = Some(sample);
        state.last_frame_at = Some(now);
        state.frames_committed += 1;
    }

    pub fn note_discarded(&self) {
        self.state.lock().frames_discarded += 1;
    }

    pub fn note_read_error(&self) {
        self.state.lock().read_errors += 1;
    }

    /// Feed one telemetry line through `assembler`, committing on completion
    pub fn ingest_line(&self, assembler: &mut FrameAssembler, line: &str, now: Instant) {
        match assembler.feed(line) {
            Ok(FrameEvent::Complete(sample)) => self.commit(sample, now),
            Ok(FrameEvent::Discarded) => {
                log::debug!("Discarding incomplete telemetry frame");
                self.note_discarded();
            }
            Ok(FrameEvent::Pending) => {}
            Err(e) => log::debug!("Skipping telemetry line {:?}: {}", line, e),
        }
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        let state = self.state.lock();
        SensorSnapshot {
            sample: state.sample,
            heading: state.heading.heading(),
            drift_rate: self.drift_rate_locked(&state),
            last_frame_at: state.last_frame_at,
            frames_committed: state.frames_committed,
            frames_discarded: state.frames_discarded,
            read_errors: state.read_errors,
        }
    }

    fn drift_rate_locked(&self, state: &SensorState) -> f32 {
        match self.drift_source {
            DriftSource::Window => state.drift.drift_rate(),
            DriftSource::BiasFilter => state.bias.estimate(),
        }
    }

    pub fn heading(&self) -> f32 {
        self.state.lock().heading.heading()
    }

    pub fn drift_rate(&self) -> f32 {
        let state = self.state.lock();
        self.drift_rate_locked(&state)
    }

    pub fn latest_sample(&self) -> Option<InertialSample> {
        self.state.lock().sample
    }

    /// Zero heading and forget drift history
    pub fn reset_heading(&self) {
        let mut state = self.state.lock();
        state.heading.reset();
        state.drift.clear();
        state.bias.reset();
    }

    pub fn is_stale_at(&self, snapshot: &SensorSnapshot, now: Instant) -> bool {
        match snapshot.frame_age(now) {
            Some(age) => age > self.stale_after,
            None => true,
        }
    }
}

/// Serial link to the inertial board
pub struct SensorLink {
    shared: Arc<SensorShared>,
    running: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
    join_timeout: Duration,
}

impl SensorLink {
    /// Open the sensor serial port and start the reader.
    pub fn connect(serial: &SerialConfig, config: &SensorConfig) -> Result<Self> {
        let transport = SerialTransport::open(
            &serial.sensor_port,
            serial.sensor_baud,
            Duration::from_millis(serial.read_timeout_ms),
        )?;
        Self::start(Box::new(transport), config)
    }

    /// Start the reader thread on an already opened transport
    pub fn start(transport: Box<dyn Transport>, config: &SensorConfig) -> Result<Self> {
        let shared = Arc::new(SensorShared::new(config));
        let running = Arc::new(AtomicBool::new(true));

        let thread_shared = Arc::clone(&shared);
        let thread_running = Arc::clone(&running);
        let retry_delay = config.retry_delay();

        let handle = thread::Builder::new()
            .name("sensor-reader".to_string())
            .spawn(move || reader_loop(transport, thread_shared, thread_running, retry_delay))
            .map_err(|e| Error::Other(format!("Failed to spawn sensor reader: {}", e)))?;

        Ok(SensorLink {
            shared,
            running,
            reader: Mutex::new(Some(handle)),
            join_timeout: config.join_timeout(),
        })
    }

    pub fn latest_sample(&self) -> Option<InertialSample> {
        self.shared.latest_sample()
    }

    /// Latest sample, or `StaleSensorData` if no frame arrived recently
    pub fn fresh_sample(&self) -> Result<InertialSample> {
        let now = Instant::now();
        let snapshot = self.shared.snapshot();
        match (snapshot.sample, self.shared.is_stale_at(&snapshot, now)) {
            (Some(sample), false) => Ok(sample),
            _ => Err(Error::StaleSensorData {
                age_ms: snapshot.frame_age(now).map(|d| d.as_millis() as u64),
            }),
        }
    }

    pub fn heading(&self) -> f32 {
        self.shared.heading()
    }

    pub fn drift_rate(&self) -> f32 {
        self.shared.drift_rate()
    }

    pub fn reset_heading(&self) {
        self.shared.reset_heading();
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        self.shared.snapshot()
    }

    /// Stop the reader and wait for it (bounded). The device closes when
    /// the reader drops its transport.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.reader.lock().take() {
            join_with_timeout(handle, self.join_timeout, "sensor-reader");
        }
    }
}

impl Drop for SensorLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl HeadingSource for SensorLink {
    fn heading(&self) -> f32 {
        self.shared.heading()
    }

    fn reset_heading(&self) {
        self.shared.reset_heading();
    }

    fn snapshot(&self) -> SensorSnapshot {
        self.shared.snapshot()
    }

    fn is_stale_at(&self, snapshot: &SensorSnapshot, now: Instant) -> bool {
        self.shared.is_stale_at(snapshot, now)
    }
}

fn reader_loop(
    mut transport: Box<dyn Transport>,
    shared: Arc<SensorShared>,
    running: Arc<AtomicBool>,
    retry_delay: Duration,
) {
    let mut read_buf = [0u8; 256];
    let mut lines = LineBuffer::new();
    let mut assembler = FrameAssembler::new();

    while running.load(Ordering::SeqCst) {
        match transport.read(&mut read_buf) {
            Ok(n) if n > 0 => {
                let now = Instant::now();
                for line in lines.push(&read_buf[..n]) {
                    shared.ingest_line(&mut assembler, &line, now);
                }
            }
            Ok(_) => thread::sleep(Duration::from_millis(1)),
            Err(e) => {
                log::warn!("Sensor read error: {}", e);
                shared.note_read_error();
                thread::sleep(retry_delay);
            }
        }
    }

    log::info!("Sensor reader exiting");
}
