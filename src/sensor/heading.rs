//! Heading integration and drift estimation

use crate::ring_buffer::RingBuffer;
use std::f32::consts::PI;
use std::time::Instant;

/// Wrap an angle into (-π, π].
///
/// Uses atan2 of sine and cosine rather than a modulo so there is no
/// discontinuity to step over. Angles already in range come back unchanged,
/// which makes the function exactly idempotent.
pub fn normalize_angle(angle: f32) -> f32 {
    if angle > -PI && angle <= PI {
        return angle;
    }
    let wrapped = angle.sin().atan2(angle.cos());
    if wrapped <= -PI {
        PI
    } else {
        wrapped
    }
}

/// Integrated heading, radians in (-π, π]
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadingState {
    heading: f32,
    last_update: Option<Instant>,
}

impl HeadingState {
    /// Integrate a yaw rate up to `now`. The first call only starts the clock.
    pub fn integrate(&mut self, gyro_z: f32, now: Instant) {
        if let Some(last) = self.last_update {
            let dt = now.saturating_duration_since(last).as_secs_f32();
            self.heading = normalize_angle(self.heading + gyro_z * dt);
        }
        self.last_update = Some(now);
    }

    pub fn heading(&self) -> f32 {
        self.heading
    }

    pub fn reset(&mut self) {
        self.heading = 0.0;
    }
}

/// Window of recent gyro-z readings; the drift rate is their mean
#[derive(Debug, Clone)]
pub struct DriftHistory {
    readings: RingBuffer<f32>,
}

impl DriftHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            readings: RingBuffer::new(capacity),
        }
    }

    pub fn push(&mut self, gyro_z: f32) {
        self.readings.push(gyro_z);
    }

    /// rad/s, 0 when empty
    pub fn drift_rate(&self) -> f32 {
        self.readings.mean()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }
}

/// Complementary low-pass of gyro-z, updated only while the robot's planar
/// acceleration is small (any yaw rate measured then is bias).
#[derive(Debug, Clone)]
pub struct BiasFilter {
    alpha: f32,
    accel_threshold: f32,
    estimate: f32,
}

impl BiasFilter {
    pub fn new(alpha: f32, accel_threshold: f32) -> Self {
        Self {
            alpha,
            accel_threshold,
            estimate: 0.0,
        }
    }

    pub fn update(&mut self, gyro_z: f32, accel_x: f32, accel_y: f32) -> f32 {
        let planar = accel_x.hypot(accel_y);
        if planar < self.accel_threshold {
            self.estimate = self.alpha * self.estimate + (1.0 - self.alpha) * gyro_z;
        }
        self.estimate
    }

    pub fn estimate(&self) -> f32 {
        self.estimate
    }

    pub fn reset(&mut self) {
        self.estimate = 0.0;
    }
}
