//! Configuration for the robot controller
//!
//! Loaded from a TOML file. Every section falls back to its defaults, so a
//! config file only needs the values that differ from the stock robot.

use crate::behavior::GoalColor;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub sensor: SensorConfig,
    pub control: ControlConfig,
    pub command: CommandConfig,
    pub behavior: BehaviorConfig,
    pub logging: LoggingConfig,
}

/// Serial ports of the two microcontrollers
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Inertial sensing board (also drives the accessory motor)
    pub sensor_port: String,
    pub sensor_baud: u32,
    /// Motion board (drive motors)
    pub motion_port: String,
    pub motion_baud: u32,
    /// Read timeout on the serial handles
    pub read_timeout_ms: u64,
    /// Both boards reset when the port opens; wait this long before use
    pub settle_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            sensor_port: "/dev/ttyUSB0".to_string(),
            sensor_baud: 115200,
            motion_port: "/dev/ttyACM0".to_string(),
            motion_baud: 115200,
            read_timeout_ms: 50,
            settle_ms: 2000,
        }
    }
}

/// How the drift-rate estimate is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSource {
    /// Mean of the last `drift_window` gyro-z readings
    Window,
    /// Low-pass of gyro-z while the robot is not accelerating
    BiasFilter,
}

/// Sensor link configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Number of gyro-z readings averaged for the drift estimate
    pub drift_window: usize,
    pub drift_source: DriftSource,
    /// Complementary filter constant for the bias filter (0-1)
    pub bias_alpha: f32,
    /// Planar acceleration (m/s²) below which the robot counts as steady
    pub bias_accel_threshold: f32,
    /// No complete frame for this long marks the sensor data stale
    pub stale_after_ms: u64,
    /// Pause after a device read error before retrying
    pub retry_delay_ms: u64,
    /// Bounded wait for the reader thread on shutdown
    pub join_timeout_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            drift_window: 10,
            drift_source: DriftSource::Window,
            bias_alpha: 0.98,
            bias_accel_threshold: 0.5,
            stale_after_ms: 500,
            retry_delay_ms: 100,
            join_timeout_ms: 2000,
        }
    }
}

impl SensorConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

/// Drift compensation loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Tick rate of the control loop
    pub rate_hz: f32,
    /// Stop the robot when no intent arrives for this long
    pub watchdog_timeout_ms: u64,
    /// Proportional gain on heading error (1/s)
    pub drift_gain: f32,
    /// Correction clamp (rad/s)
    pub max_correction: f32,
    /// Commanded |omega| at or below this counts as "not rotating" (rad/s)
    pub omega_deadband: f32,
    pub drift_compensation: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            rate_hz: 50.0,
            watchdog_timeout_ms: 1000,
            drift_gain: 2.0,
            max_correction: 1.0,
            omega_deadband: 0.01,
            drift_compensation: true,
        }
    }
}

impl ControlConfig {
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.rate_hz)
    }
}

/// Fastest control loop the serial link can keep up with
pub const MAX_RATE_HZ: f32 = 1000.0;

/// Datagram command listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandConfig {
    /// UDP bind address
    ///
    /// Examples:
    /// - `0.0.0.0:5005` - all interfaces
    /// - `127.0.0.1:5005` - localhost only
    pub bind: String,
    /// Receive timeout; bounds how long shutdown waits on the listener
    pub recv_timeout_ms: u64,
    /// Send the STATUS text back to the requesting peer
    pub reply_status: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5005".to_string(),
            recv_timeout_ms: 100,
            reply_status: true,
        }
    }
}

impl CommandConfig {
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

/// Autonomous game behaviour tuning
///
/// Pixel areas and tolerances are specific to the camera and lens in use.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Goal we score in
    pub target_goal: GoalColor,
    /// Balls to collect before heading for the goal
    pub max_balls: u32,
    pub game_duration_s: f32,

    pub search_rotation_speed: f32,
    /// SearchBall spins for this long, then drives an arc for `search_drive_s`
    pub search_spin_s: f32,
    pub search_drive_s: f32,
    pub search_drive_omega: f32,

    pub approach_speed: f32,
    /// Steering gain, rad/s per pixel of horizontal offset
    pub approach_kp: f32,
    pub ball_close_area: f32,
    pub ball_center_tolerance: f32,
    /// Fraction of frame height below which a ball counts as "at the intake"
    pub bottom_threshold: f32,
    pub collecting_time_s: f32,

    pub goal_close_area: f32,
    pub goal_center_tolerance: f32,
    pub deposit_time_s: f32,
    pub deposit_backup_speed: f32,

    /// LeaveGoal ends after this long or after turning `leave_turn_angle`
    pub leave_turn_time_s: f32,
    pub leave_turn_angle: f32,

    /// Keep the intake running while searching for and approaching the goal
    pub intake_during_goal_search: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            target_goal: GoalColor::Blue,
            max_balls: 3,
            game_duration_s: 150.0,
            search_rotation_speed: 2.0,
            search_spin_s: 4.0,
            search_drive_s: 1.5,
            search_drive_omega: 0.5,
            approach_speed: 0.75,
            approach_kp: 0.003,
            ball_close_area: 32000.0,
            ball_center_tolerance: 80.0,
            bottom_threshold: 0.85,
            collecting_time_s: 4.0,
            goal_close_area: 100000.0,
            goal_center_tolerance: 100.0,
            deposit_time_s: 3.0,
            deposit_backup_speed: -0.6,
            leave_turn_time_s: 1.6,
            leave_turn_angle: 2.8,
            intake_during_goal_search: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or destabilise the loops
    pub fn validate(&self) -> Result<()> {
        let control = &self.control;
        if !(control.rate_hz.is_finite() && control.rate_hz >= 1.0 && control.rate_hz <= MAX_RATE_HZ) {
            return Err(Error::Config(format!(
                "control.rate_hz must be within 1..={}",
                MAX_RATE_HZ
            )));
        }
        if control.watchdog_timeout_ms == 0 {
            return Err(Error::Config(
                "control.watchdog_timeout_ms must be positive".into(),
            ));
        }
        for (name, value) in [
            ("control.drift_gain", control.drift_gain),
            ("control.max_correction", control.max_correction),
            ("control.omega_deadband", control.omega_deadband),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!("{} must be finite and not negative", name)));
            }
        }

        if self.sensor.drift_window == 0 {
            return Err(Error::Config("sensor.drift_window must be at least 1".into()));
        }
        //NaN fails the range check too
        if !(0.0..=1.0).contains(&self.sensor.bias_alpha) {
            return Err(Error::Config("sensor.bias_alpha must be within 0..=1".into()));
        }
        if !self.sensor.bias_accel_threshold.is_finite() {
            return Err(Error::Config("sensor.bias_accel_threshold must be finite".into()));
        }

        if self.command.recv_timeout_ms == 0 {
            // UdpSocket::set_read_timeout rejects a zero duration
            return Err(Error::Config("command.recv_timeout_ms must be positive".into()));
        }

        let behavior = &self.behavior;
        let tuning = [
            behavior.game_duration_s,
            behavior.search_rotation_speed,
            behavior.search_spin_s,
            behavior.search_drive_s,
            behavior.search_drive_omega,
            behavior.approach_speed,
            behavior.approach_kp,
            behavior.ball_close_area,
            behavior.ball_center_tolerance,
            behavior.bottom_threshold,
            behavior.collecting_time_s,
            behavior.goal_close_area,
            behavior.goal_center_tolerance,
            behavior.deposit_time_s,
            behavior.deposit_backup_speed,
            behavior.leave_turn_time_s,
            behavior.leave_turn_angle,
        ];
        if tuning.iter().any(|v| !v.is_finite()) {
            return Err(Error::Config("behavior values must be finite".into()));
        }
        if behavior.search_spin_s + behavior.search_drive_s <= 0.0 {
            return Err(Error::Config("behavior search cycle must be positive".into()));
        }
        Ok(())
    }
}
