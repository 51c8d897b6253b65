/**
 * Behavior Module
 *
 * Autonomous game play. The vision pipeline hands over a list of
 * detections per frame; the engine turns them into a velocity intent and
 * an intake mode which the robot feeds to the compensator as the
 * autonomous intent source.
 */

pub mod engine;

pub use engine::{BehaviorEngine, BehaviorOutput, BehaviorState, Motion};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalColor {
    Blue,
    Yellow,
}

impl GoalColor {
    pub fn label(&self) -> &'static str {
        match self {
            GoalColor::Blue => "Blue Goal",
            GoalColor::Yellow => "Yellow Goal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Ball,
    Goal(GoalColor),
}

impl ObjectKind {
    /// Map a vision label ("Ball", "Blue Goal", "Yellow Goal"); case-insensitive
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        if label == "ball" {
            return Some(ObjectKind::Ball);
        }
        if label.contains("goal") {
            if label.contains("blue") {
                return Some(ObjectKind::Goal(GoalColor::Blue));
            }
            if label.contains("yellow") {
                return Some(ObjectKind::Goal(GoalColor::Yellow));
            }
        }
        None
    }
}

/// One object found in a camera frame, pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub kind: ObjectKind,
    pub center: (f32, f32),
    pub area: f32,
}

impl Detection {
    pub fn new(kind: ObjectKind, x: f32, y: f32, area: f32) -> Self {
        Self {
            kind,
            center: (x, y),
            area,
        }
    }

    /// Build from a raw vision label; unknown labels yield `None`
    pub fn from_label(label: &str, x: f32, y: f32, area: f32) -> Option<Self> {
        ObjectKind::from_label(label).map(|kind| Self::new(kind, x, y, area))
    }
}

/// Everything the engine sees for one frame
#[derive(Debug, Clone, Default)]
pub struct BehaviorInput {
    pub detections: Vec<Detection>,
    pub frame_width: f32,
    pub frame_height: f32,
    /// Current heading if known; used to end the disengage turn
    pub heading: Option<f32>,
}

impl BehaviorInput {
    /// Largest instance of `kind` by area
    pub fn largest(&self, kind: ObjectKind) -> Option<&Detection> {
        self.detections
            .iter()
            .filter(|d| d.kind == kind && d.area.is_finite())
            .max_by(|a, b| a.area.total_cmp(&b.area))
    }

    pub fn center_x(&self) -> f32 {
        self.frame_width / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(ObjectKind::from_label("Ball"), Some(ObjectKind::Ball));
        assert_eq!(ObjectKind::from_label("Blue Goal"), Some(ObjectKind::Goal(GoalColor::Blue)));
        assert_eq!(ObjectKind::from_label("yellow goal"), Some(ObjectKind::Goal(GoalColor::Yellow)));
        assert_eq!(ObjectKind::from_label("Robot"), None);
        assert_eq!(ObjectKind::from_label(GoalColor::Yellow.label()), Some(ObjectKind::Goal(GoalColor::Yellow)));
    }

    #[test]
    fn test_largest_by_area() {
        let input = BehaviorInput {
            detections: vec![
                Detection::new(ObjectKind::Ball, 100.0, 100.0, 500.0),
                Detection::new(ObjectKind::Goal(GoalColor::Blue), 300.0, 200.0, 90000.0),
                Detection::new(ObjectKind::Ball, 400.0, 300.0, 1200.0),
            ],
            frame_width: 640.0,
            frame_height: 480.0,
            heading: None,
        };
        assert_eq!(input.largest(ObjectKind::Ball).unwrap().area, 1200.0);
        assert!(input.largest(ObjectKind::Goal(GoalColor::Yellow)).is_none());
    }
}
