/**
 * Control Module
 *
 * Closed-loop layer between the intent producers and the motion board:
 * - DriftCompensator holds the desired intent and corrects heading drift
 * - ControlLoop ticks the compensator at a fixed rate on its own thread
 */

pub mod compensator;
pub mod runner;

pub use compensator::{ControllerStatus, DriftCompensator, TickOutcome};
pub use runner::ControlLoop;

use std::time::Instant;

use crate::sensor::SensorSnapshot;

/// Desired robot velocity in the robot frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VelocityIntent {
    pub vx: f32,    //m/s forward
    pub vy: f32,    //m/s strafe
    pub omega: f32, //rad/s
}

impl VelocityIntent {
    pub fn new(vx: f32, vy: f32, omega: f32) -> Self {
        Self { vx, vy, omega }
    }

    pub fn is_finite(&self) -> bool {
        self.vx.is_finite() && self.vy.is_finite() && self.omega.is_finite()
    }
}

/// Who is allowed to write intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentSource {
    /// Remote operator over the datagram protocol
    Operator,
    /// On-board behaviour engine
    Autonomous,
}

/// Heading feedback consumed by the compensator
pub trait HeadingSource: Send + Sync {
    /// Current heading, radians in (-π, π]
    fn heading(&self) -> f32;

    /// Zero heading and drift history
    fn reset_heading(&self);

    /// Heading, drift and frame time taken under one read
    fn snapshot(&self) -> SensorSnapshot;

    /// Whether `snapshot` is too old to steer by at `now`
    fn is_stale_at(&self, snapshot: &SensorSnapshot, now: Instant) -> bool;
}
