/**
 * Drift Compensator
 *
 * Holds the desired velocity intent and, each tick:
 * 1. Stops the robot if no intent arrived within the watchdog timeout
 * 2. Otherwise copies the intent and, while no rotation is commanded,
 *    steers back to the locked heading:
 *      correction = gain * (target - heading) - drift_rate
 *    clamped to ±max_correction
 * 3. Sends the result to the motion board
 *
 * Lock order is actuators, then intent state. Sensor reads take only the
 * sensor link's own lock.
 */

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{HeadingSource, IntentSource, VelocityIntent};
use crate::actuator::{AccessoryMode, ActuatorLink};
use crate::config::ControlConfig;
use crate::error::{Error, Result};
use crate::sensor::{normalize_angle, InertialSample};

#[derive(Debug)]
struct IntentState {
    authority: IntentSource,
    intent: VelocityIntent,
    /// `None` once the watchdog has nothing fresh to honour
    last_intent_at: Option<Instant>,
    target_heading: Option<f32>,
    drift_compensation: bool,
    watchdog_tripped: bool,
    stale_suppressed: bool,
    write_failing: bool,
    last_sent: Option<VelocityIntent>,
}

impl IntentState {
    //zero intent and leave the watchdog expired
    fn clear_intent(&mut self) {
        self.intent = VelocityIntent::default();
        self.last_intent_at = None;
        self.target_heading = None;
    }
}

/// What a tick sent to the motion board
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Watchdog expired, STOP sent
    Stopped,
    /// Velocity command sent, drift correction included
    Sent(VelocityIntent),
}

pub struct DriftCompensator {
    sensors: Arc<dyn HeadingSource>,
    actuators: Mutex<ActuatorLink>,
    state: Mutex<IntentState>,
    gain: f32,
    max_correction: f32,
    omega_deadband: f32,
    watchdog_timeout: Duration,
}

impl DriftCompensator {
    pub fn new(sensors: Arc<dyn HeadingSource>, actuators: ActuatorLink, config: &ControlConfig) -> Self {
        log::info!(
            "Drift compensator: gain {}, max correction {} rad/s, watchdog {:?}",
            config.drift_gain,
            config.max_correction,
            config.watchdog_timeout()
        );

        Self {
            sensors,
            actuators: Mutex::new(actuators),
            state: Mutex::new(IntentState {
                authority: IntentSource::Operator,
                intent: VelocityIntent::default(),
                last_intent_at: None,
                target_heading: None,
                drift_compensation: config.drift_compensation,
                watchdog_tripped: false,
                stale_suppressed: false,
                write_failing: false,
                last_sent: None,
            }),
            gain: config.drift_gain,
            max_correction: config.max_correction,
            omega_deadband: config.omega_deadband,
            watchdog_timeout: config.watchdog_timeout(),
        }
    }

    /// Store a new intent from `source` and refresh the watchdog
    pub fn set_intent(&self, source: IntentSource, vx: f32, vy: f32, omega: f32) -> Result<()> {
        self.set_intent_at(source, VelocityIntent::new(vx, vy, omega), Instant::now())
    }

    pub fn set_intent_at(&self, source: IntentSource, intent: VelocityIntent, now: Instant) -> Result<()> {
        if !intent.is_finite() {
            return Err(Error::Command(format!("non-finite intent {:?}", intent)));
        }

        let mut state = self.state.lock();
        if state.authority != source {
            return Err(Error::NotInControl { requester: source });
        }

        state.intent = intent;
        state.last_intent_at = Some(now);

        if intent.omega.abs() > self.omega_deadband {
            //operator is steering, nothing to hold
            state.target_heading = None;
        } else if state.target_heading.is_none() {
            //rotation just stopped: lock the heading now, not at a later tick
            let heading = self.sensors.heading();
            state.target_heading = Some(heading);
            log::debug!("Heading locked at {:.1}°", heading.to_degrees());
        }
        Ok(())
    }

    /// Run one control step now
    pub fn tick(&self) -> TickOutcome {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&self, now: Instant) -> TickOutcome {
        let mut actuators = self.actuators.lock();

        let (intent, target, compensate) = {
            let mut state = self.state.lock();
            let expired = match state.last_intent_at {
                Some(t) => now.saturating_duration_since(t) > self.watchdog_timeout,
                None => true,
            };

            if expired {
                if !state.watchdog_tripped && state.last_intent_at.is_some() {
                    log::warn!("No intent for {:?}, stopping", self.watchdog_timeout);
                }
                state.watchdog_tripped = true;
                state.last_sent = None;
                drop(state);
                if let Err(e) = actuators.stop() {
                    log::warn!("Failed to send stop: {}", e);
                }
                return TickOutcome::Stopped;
            }

            state.watchdog_tripped = false;
            (state.intent, state.target_heading, state.drift_compensation)
        };

        let mut cmd = intent;

        if compensate && intent.omega.abs() <= self.omega_deadband {
            if let Some(target) = target {
                //heading and drift must come from the same frame
                let reading = self.sensors.snapshot();
                let stale = self.sensors.is_stale_at(&reading, now);
                self.note_staleness(stale);
                if !stale {
                    cmd.omega += self.correction(target, reading.heading, reading.drift_rate);
                }
            }
        }

        let result = actuators.send_velocity(cmd.vx, cmd.vy, cmd.omega);
        drop(actuators);

        let mut state = self.state.lock();
        match result {
            Ok(()) if state.write_failing => {
                log::info!("Motion board writes recovered");
                state.write_failing = false;
            }
            Err(e) if !state.write_failing => {
                log::warn!("Failed to send velocity: {}", e);
                state.write_failing = true;
            }
            _ => {}
        }
        state.last_sent = Some(cmd);

        TickOutcome::Sent(cmd)
    }

    /// Heading-hold correction, clamped
    pub fn correction(&self, target: f32, heading: f32, drift_rate: f32) -> f32 {
        let heading_error = normalize_angle(target - heading);
        let correction = self.gain * heading_error - drift_rate;
        correction.clamp(-self.max_correction, self.max_correction)
    }

    fn note_staleness(&self, stale: bool) {
        let mut state = self.state.lock();
        if stale && !state.stale_suppressed {
            log::warn!("Sensor data stale, drift correction suppressed");
        } else if !stale && state.stale_suppressed {
            log::info!("Sensor data fresh again, drift correction resumed");
        }
        state.stale_suppressed = stale;
    }

    /// Change the accessory motor mode (sent only on change)
    pub fn set_accessory(&self, source: IntentSource, mode: AccessoryMode) -> Result<()> {
        let mut actuators = self.actuators.lock();
        if self.state.lock().authority != source {
            return Err(Error::NotInControl { requester: source });
        }
        actuators.set_accessory(mode)?;
        Ok(())
    }

    /// Zero heading and lock the new zero as target. While a rotation is
    /// commanded the target stays unset and latches when rotation stops.
    pub fn reset_heading(&self) {
        self.sensors.reset_heading();
        let mut state = self.state.lock();
        state.target_heading = if state.intent.omega.abs() <= self.omega_deadband {
            Some(0.0)
        } else {
            None
        };
        log::info!("Heading reset to 0");
    }

    /// Zero the intent, stop the drive and the accessory motor.
    ///
    /// Accepted from any source. The accessory stop bypasses the
    /// de-duplication cache.
    pub fn emergency_stop(&self) {
        let mut actuators = self.actuators.lock();
        {
            let mut state = self.state.lock();
            state.clear_intent();
            state.watchdog_tripped = true;
            state.last_sent = None;
        }
        if let Err(e) = actuators.stop() {
            log::error!("Emergency stop: drive stop failed: {}", e);
        }
        if let Err(e) = actuators.force_accessory(AccessoryMode::Stop) {
            log::error!("Emergency stop: accessory stop failed: {}", e);
        }
        log::warn!("EMERGENCY STOP");
    }

    /// Stop driving without touching the accessory motor
    pub fn halt(&self, source: IntentSource) -> Result<()> {
        let mut actuators = self.actuators.lock();
        {
            let mut state = self.state.lock();
            if state.authority != source {
                return Err(Error::NotInControl { requester: source });
            }
            state.clear_intent();
            state.watchdog_tripped = true;
            state.last_sent = None;
        }
        actuators.stop()
    }

    /// Hand intent authority to another producer. The intent is cleared so
    /// nothing carries across.
    pub fn set_authority(&self, source: IntentSource) {
        let mut state = self.state.lock();
        if state.authority != source {
            log::info!("Control authority: {:?} -> {:?}", state.authority, source);
            state.authority = source;
            state.clear_intent();
        }
    }

    pub fn authority(&self) -> IntentSource {
        self.state.lock().authority
    }

    pub fn set_drift_compensation(&self, enabled: bool) {
        self.state.lock().drift_compensation = enabled;
        log::info!("Drift compensation: {}", if enabled { "ENABLED" } else { "DISABLED" });
    }

    pub fn target_heading(&self) -> Option<f32> {
        self.state.lock().target_heading
    }

    pub fn intent(&self) -> VelocityIntent {
        self.state.lock().intent
    }

    pub fn status(&self) -> ControllerStatus {
        let now = Instant::now();
        let (accessory, write_failures) = {
            let actuators = self.actuators.lock();
            (actuators.accessory_mode(), actuators.write_failures())
        };
        let state = self.state.lock();
        let sensors = self.sensors.snapshot();

        ControllerStatus {
            authority: state.authority,
            desired: state.intent,
            last_sent: state.last_sent,
            heading: sensors.heading,
            target_heading: state.target_heading,
            drift_rate: sensors.drift_rate,
            sensor_stale: self.sensors.is_stale_at(&sensors, now),
            sample: sensors.sample,
            frames_committed: sensors.frames_committed,
            frames_discarded: sensors.frames_discarded,
            read_errors: sensors.read_errors,
            accessory,
            drift_compensation: state.drift_compensation,
            watchdog_tripped: state.watchdog_tripped,
            write_failures,
        }
    }
}

/// Diagnostic snapshot for STATUS
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub authority: IntentSource,
    pub desired: VelocityIntent,
    pub last_sent: Option<VelocityIntent>,
    pub heading: f32,
    pub target_heading: Option<f32>,
    pub drift_rate: f32,
    pub sensor_stale: bool,
    pub sample: Option<InertialSample>,
    pub frames_committed: u64,
    pub frames_discarded: u64,
    pub read_errors: u64,
    pub accessory: Option<AccessoryMode>,
    pub drift_compensation: bool,
    pub watchdog_tripped: bool,
    pub write_failures: u64,
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Controller Status ===")?;
        writeln!(f, "Authority: {:?}", self.authority)?;
        writeln!(
            f,
            "Desired: vx={:.2} m/s, vy={:.2} m/s, omega={:.2} rad/s",
            self.desired.vx, self.desired.vy, self.desired.omega
        )?;
        if let Some(sent) = self.last_sent {
            writeln!(f, "Sent: vx={:.2} vy={:.2} omega={:.3}", sent.vx, sent.vy, sent.omega)?;
        }
        write!(f, "Heading: {:.1}°", self.heading.to_degrees())?;
        match self.target_heading {
            Some(target) => writeln!(f, " (target {:.1}°)", target.to_degrees())?,
            None => writeln!(f, " (no target)")?,
        }
        writeln!(f, "Drift Rate: {:.4} rad/s", self.drift_rate)?;
        writeln!(
            f,
            "Sensor: {}, {} frames ({} discarded, {} read errors)",
            if self.sensor_stale { "STALE" } else { "fresh" },
            self.frames_committed,
            self.frames_discarded,
            self.read_errors
        )?;
        if let Some(sample) = self.sample {
            writeln!(
                f,
                "IMU: t={} ms gyro_z={:.4} temp={:.1}°C",
                sample.timestamp_ms, sample.gyro.z, sample.temperature
            )?;
        }
        writeln!(
            f,
            "Accessory: {}",
            self.accessory.map_or("UNKNOWN".to_string(), |m| m.as_str().to_uppercase())
        )?;
        writeln!(f, "Drift Compensation: {}", if self.drift_compensation { "ON" } else { "OFF" })?;
        writeln!(f, "Watchdog: {}", if self.watchdog_tripped { "TRIPPED" } else { "ok" })?;
        write!(f, "Write failures: {}", self.write_failures)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sensor::SensorSnapshot;
    use crate::transport::MockTransport;
    use approx::assert_relative_eq;

    /// Heading source driven by the test
    #[derive(Default)]
    pub(crate) struct SimHeading {
        pub heading: Mutex<f32>,
        pub drift_rate: Mutex<f32>,
        pub stale: Mutex<bool>,
        pub resets: Mutex<u32>,
        pub reads: Mutex<u32>,
    }

    impl SimHeading {
        pub fn set_heading(&self, heading: f32) {
            *self.heading.lock() = heading;
        }
    }

    impl HeadingSource for SimHeading {
        fn heading(&self) -> f32 {
            *self.heading.lock()
        }

        fn reset_heading(&self) {
            *self.heading.lock() = 0.0;
            *self.resets.lock() += 1;
        }

        fn snapshot(&self) -> SensorSnapshot {
            *self.reads.lock() += 1;
            SensorSnapshot {
                sample: None,
                heading: *self.heading.lock(),
                drift_rate: *self.drift_rate.lock(),
                last_frame_at: None,
                frames_committed: 0,
                frames_discarded: 0,
                read_errors: 0,
            }
        }

        fn is_stale_at(&self, _snapshot: &SensorSnapshot, _now: Instant) -> bool {
            *self.stale.lock()
        }
    }

    pub(crate) struct Harness {
        pub compensator: Arc<DriftCompensator>,
        pub sensors: Arc<SimHeading>,
        pub motion: MockTransport,
        pub accessory: MockTransport,
    }

    pub(crate) fn harness(config: ControlConfig) -> Harness {
        let sensors = Arc::new(SimHeading::default());
        let motion = MockTransport::new();
        let accessory = MockTransport::new();
        let link = ActuatorLink::new(Box::new(motion.clone()), Box::new(accessory.clone()));
        let compensator = Arc::new(DriftCompensator::new(sensors.clone(), link, &config));
        Harness {
            compensator,
            sensors,
            motion,
            accessory,
        }
    }

    #[test]
    fn test_watchdog_stops_without_intent() {
        let h = harness(ControlConfig::default());
        let t0 = Instant::now();
        for i in 0..5 {
            let outcome = h.compensator.tick_at(t0 + Duration::from_millis(20 * i));
            assert_eq!(outcome, TickOutcome::Stopped);
        }
        assert!(h.motion.written_lines().iter().all(|l| l == "STOP"));
    }

    #[test]
    fn test_watchdog_trips_after_timeout() {
        let h = harness(ControlConfig::default());
        let t0 = Instant::now();
        h.compensator
            .set_intent_at(IntentSource::Operator, VelocityIntent::new(0.5, 0.0, 0.3), t0)
            .unwrap();

        assert!(matches!(h.compensator.tick_at(t0 + Duration::from_millis(900)), TickOutcome::Sent(_)));
        h.motion.clear_written();

        for ms in [1100, 1500, 3000] {
            assert_eq!(h.compensator.tick_at(t0 + Duration::from_millis(ms)), TickOutcome::Stopped);
        }
        assert_eq!(h.motion.written_lines(), vec!["STOP", "STOP", "STOP"]);
        assert!(h.compensator.status().watchdog_tripped);
    }

    #[test]
    fn test_target_heading_latch() {
        let h = harness(ControlConfig::default());
        let t0 = Instant::now();

        h.sensors.set_heading(0.1);
        h.compensator
            .set_intent_at(IntentSource::Operator, VelocityIntent::new(0.0, 0.0, 0.5), t0)
            .unwrap();
        assert_eq!(h.compensator.target_heading(), None);

        h.sensors.set_heading(0.3);
        h.compensator
            .set_intent_at(IntentSource::Operator, VelocityIntent::new(0.0, 0.0, 0.0), t0)
            .unwrap();
        assert_eq!(h.compensator.target_heading(), Some(0.3));

        //later ticks and zero-omega refreshes keep the first lock
        h.sensors.set_heading(0.6);
        h.compensator.tick_at(t0 + Duration::from_millis(20));
        h.compensator
            .set_intent_at(IntentSource::Operator, VelocityIntent::new(0.2, 0.0, 0.0), t0)
            .unwrap();
        assert_eq!(h.compensator.target_heading(), Some(0.3));
    }

    #[test]
    fn test_no_correction_while_rotating() {
        let h = harness(ControlConfig::default());
        let t0 = Instant::now();
        h.sensors.set_heading(1.0);
        h.compensator
            .set_intent_at(IntentSource::Operator, VelocityIntent::new(0.0, 0.0, 0.8), t0)
            .unwrap();
        assert_eq!(
            h.compensator.tick_at(t0),
            TickOutcome::Sent(VelocityIntent::new(0.0, 0.0, 0.8))
        );
    }

    #[test]
    fn test_correction_formula_and_clamp() {
        let h = harness(ControlConfig::default());
        //gain 2.0: 2 * 0.1 - 0.05
        assert_relative_eq!(h.compensator.correction(0.1, 0.0, 0.05), 0.15, epsilon = 1e-6);
        assert_eq!(h.compensator.correction(2.0, 0.0, 0.0), 1.0);
        assert_eq!(h.compensator.correction(-2.0, 0.0, 0.0), -1.0);
        //error wraps through ±π
        assert_relative_eq!(h.compensator.correction(3.0, -3.0, 0.0), 2.0 * (6.0 - 2.0 * std::f32::consts::PI), epsilon = 1e-4);
    }

    #[test]
    fn test_stale_sensor_suppresses_correction() {
        let h = harness(ControlConfig::default());
        let t0 = Instant::now();
        h.compensator
            .set_intent_at(IntentSource::Operator, VelocityIntent::new(1.0, 0.0, 0.0), t0)
            .unwrap();
        h.sensors.set_heading(0.4);
        *h.sensors.stale.lock() = true;

        assert_eq!(
            h.compensator.tick_at(t0),
            TickOutcome::Sent(VelocityIntent::new(1.0, 0.0, 0.0))
        );

        *h.sensors.stale.lock() = false;
        match h.compensator.tick_at(t0) {
            TickOutcome::Sent(cmd) => assert!(cmd.omega < 0.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_drift_compensation_toggle() {
        let h = harness(ControlConfig::default());
        let t0 = Instant::now();
        h.compensator
            .set_intent_at(IntentSource::Operator, VelocityIntent::new(1.0, 0.0, 0.0), t0)
            .unwrap();
        h.sensors.set_heading(0.4);
        h.compensator.set_drift_compensation(false);
        assert_eq!(
            h.compensator.tick_at(t0),
            TickOutcome::Sent(VelocityIntent::new(1.0, 0.0, 0.0))
        );
    }

    #[test]
    fn test_reset_heading_targets_zero() {
        let h = harness(ControlConfig::default());
        h.sensors.set_heading(1.2);
        h.compensator.reset_heading();
        assert_eq!(*h.sensors.resets.lock(), 1);
        assert_eq!(h.compensator.target_heading(), Some(0.0));
    }

    #[test]
    fn test_reset_heading_while_rotating_latches_on_release() {
        let h = harness(ControlConfig::default());
        let t0 = Instant::now();
        h.compensator
            .set_intent_at(IntentSource::Operator, VelocityIntent::new(0.0, 0.0, 0.5), t0)
            .unwrap();

        h.compensator.reset_heading();
        assert_eq!(h.compensator.target_heading(), None);
        //still turning: no pull back toward zero
        assert_eq!(
            h.compensator.tick_at(t0),
            TickOutcome::Sent(VelocityIntent::new(0.0, 0.0, 0.5))
        );

        h.sensors.set_heading(1.0);
        h.compensator
            .set_intent_at(IntentSource::Operator, VelocityIntent::new(0.0, 0.0, 0.0), t0)
            .unwrap();
        assert_eq!(h.compensator.target_heading(), Some(1.0));
    }

    #[test]
    fn test_tick_reads_heading_and_drift_together() {
        let h = harness(ControlConfig::default());
        let t0 = Instant::now();
        h.compensator
            .set_intent_at(IntentSource::Operator, VelocityIntent::new(1.0, 0.0, 0.0), t0)
            .unwrap();
        h.sensors.set_heading(0.1);
        *h.sensors.drift_rate.lock() = 0.05;
        *h.sensors.reads.lock() = 0;

        match h.compensator.tick_at(t0) {
            //2 * (0 - 0.1) - 0.05
            TickOutcome::Sent(cmd) => assert_relative_eq!(cmd.omega, -0.25, epsilon = 1e-6),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(*h.sensors.reads.lock(), 1);
    }

    #[test]
    fn test_emergency_stop_then_velocity() {
        let h = harness(ControlConfig::default());
        let t0 = Instant::now();
        h.compensator.set_accessory(IntentSource::Operator, AccessoryMode::Stop).unwrap();
        h.compensator
            .set_intent_at(IntentSource::Operator, VelocityIntent::new(1.0, 0.0, 0.5), t0)
            .unwrap();

        h.compensator.emergency_stop();
        assert_eq!(h.compensator.intent(), VelocityIntent::default());
        //accessory stop resent despite cache
        assert_eq!(h.accessory.written_lines(), vec!["S", "S"]);
        assert_eq!(h.compensator.tick_at(t0), TickOutcome::Stopped);

        h.compensator
            .set_intent_at(IntentSource::Operator, VelocityIntent::new(0.3, 0.0, 0.5), t0)
            .unwrap();
        assert_eq!(
            h.compensator.tick_at(t0 + Duration::from_millis(20)),
            TickOutcome::Sent(VelocityIntent::new(0.3, 0.0, 0.5))
        );
    }

    #[test]
    fn test_authority_gates_writers() {
        let h = harness(ControlConfig::default());
        let t0 = Instant::now();
        h.compensator
            .set_intent_at(IntentSource::Operator, VelocityIntent::new(1.0, 0.0, 0.0), t0)
            .unwrap();

        h.compensator.set_authority(IntentSource::Autonomous);
        assert_eq!(h.compensator.intent(), VelocityIntent::default());
        assert!(matches!(
            h.compensator.set_intent(IntentSource::Operator, 1.0, 0.0, 0.0),
            Err(Error::NotInControl { requester: IntentSource::Operator })
        ));
        assert!(h.compensator.set_accessory(IntentSource::Operator, AccessoryMode::Forward).is_err());
        //nothing fresh after the switch
        assert_eq!(h.compensator.tick_at(t0), TickOutcome::Stopped);

        h.compensator
            .set_intent_at(IntentSource::Autonomous, VelocityIntent::new(0.5, 0.0, 2.0), t0)
            .unwrap();
        assert!(matches!(h.compensator.tick_at(t0), TickOutcome::Sent(_)));

        h.compensator.halt(IntentSource::Autonomous).unwrap();
        assert_eq!(h.compensator.tick_at(t0), TickOutcome::Stopped);
    }

    #[test]
    fn test_rejects_non_finite_intent() {
        let h = harness(ControlConfig::default());
        assert!(h.compensator.set_intent(IntentSource::Operator, f32::NAN, 0.0, 0.0).is_err());
        assert_eq!(h.compensator.intent(), VelocityIntent::default());
    }

    #[test]
    fn test_status_text() {
        let h = harness(ControlConfig::default());
        h.compensator.set_intent(IntentSource::Operator, 0.5, 0.0, 0.0).unwrap();
        let text = h.compensator.status().to_string();
        assert!(text.contains("Desired: vx=0.50"));
        assert!(text.contains("Drift Compensation: ON"));
    }
}
