//! Game state machine
//!
//! ```text
//! Idle -> SearchBall -> ApproachBall -> Collecting -> SearchGoal
//!            ^                                            |
//!            |                                            v
//!        LeaveGoal <------- Depositing <-------- ApproachGoal
//! ```
//!
//! Every active state falls back to Idle once the game clock runs out.
//! Targets are always the largest visible instance, there is no tracking
//! across frames.

use std::time::Instant;

use super::{BehaviorInput, Detection, ObjectKind};
use crate::actuator::AccessoryMode;
use crate::config::BehaviorConfig;
use crate::control::VelocityIntent;
use crate::sensor::normalize_angle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorState {
    Idle,
    SearchBall,
    ApproachBall,
    Collecting,
    SearchGoal,
    ApproachGoal,
    Depositing,
    LeaveGoal,
}

/// What the drive should do this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    /// Leave the drive alone; the watchdog stops it if nothing else writes
    Hold,
    Drive(VelocityIntent),
    /// Stop now
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BehaviorOutput {
    pub motion: Motion,
    pub accessory: Option<AccessoryMode>,
}

impl BehaviorOutput {
    fn drive(vx: f32, vy: f32, omega: f32, accessory: AccessoryMode) -> Self {
        Self {
            motion: Motion::Drive(VelocityIntent::new(vx, vy, omega)),
            accessory: Some(accessory),
        }
    }

    fn idle() -> Self {
        Self {
            motion: Motion::Hold,
            accessory: None,
        }
    }

    fn halt() -> Self {
        Self {
            motion: Motion::Halt,
            accessory: Some(AccessoryMode::Stop),
        }
    }
}

pub struct BehaviorEngine {
    config: BehaviorConfig,
    state: BehaviorState,
    state_entered: Instant,
    game_started: Option<Instant>,
    balls_collected: u32,
    /// ApproachBall: tracked ball reached the intake zone
    ball_centered: bool,
    /// ApproachGoal: goal has been seen near frame centre
    goal_centered: bool,
    /// LeaveGoal: heading when the turn started
    leave_start_heading: Option<f32>,
}

impl BehaviorEngine {
    pub fn new(config: BehaviorConfig) -> Self {
        Self {
            config,
            state: BehaviorState::Idle,
            state_entered: Instant::now(),
            game_started: None,
            balls_collected: 0,
            ball_centered: false,
            goal_centered: false,
            leave_start_heading: None,
        }
    }

    pub fn state(&self) -> BehaviorState {
        self.state
    }

    pub fn balls_collected(&self) -> u32 {
        self.balls_collected
    }

    pub fn game_elapsed(&self, now: Instant) -> Option<f32> {
        self.game_started
            .map(|start| now.saturating_duration_since(start).as_secs_f32())
    }

    /// Reset the quota and the game clock, begin searching
    pub fn start_game(&mut self, now: Instant) {
        log::info!(
            "Game started: target {:?}, {} balls per trip, {} s",
            self.config.target_goal,
            self.config.max_balls,
            self.config.game_duration_s
        );
        self.game_started = Some(now);
        self.balls_collected = 0;
        self.ball_centered = false;
        self.goal_centered = false;
        self.enter(BehaviorState::SearchBall, now);
    }

    pub fn stop_game(&mut self) {
        if self.state != BehaviorState::Idle {
            log::info!("Game stopped in {:?}", self.state);
        }
        self.state = BehaviorState::Idle;
        self.game_started = None;
    }

    /// Advance one camera frame
    pub fn update(&mut self, input: &BehaviorInput, now: Instant) -> BehaviorOutput {
        if self.state != BehaviorState::Idle {
            if let Some(elapsed) = self.game_elapsed(now) {
                if elapsed > self.config.game_duration_s {
                    log::info!("Game over after {:.0} s", elapsed);
                    self.stop_game();
                    return BehaviorOutput::halt();
                }
            }
        }
        self.step(input, now)
    }

    fn step(&mut self, input: &BehaviorInput, now: Instant) -> BehaviorOutput {
        match self.state {
            BehaviorState::Idle => BehaviorOutput::idle(),
            BehaviorState::SearchBall => self.search_ball(input, now),
            BehaviorState::ApproachBall => self.approach_ball(input, now),
            BehaviorState::Collecting => self.collecting(input, now),
            BehaviorState::SearchGoal => self.search_goal(input, now),
            BehaviorState::ApproachGoal => self.approach_goal(input, now),
            BehaviorState::Depositing => self.depositing(input, now),
            BehaviorState::LeaveGoal => self.leave_goal(input, now),
        }
    }

    fn enter(&mut self, state: BehaviorState, now: Instant) {
        log::info!("Behavior: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.state_entered = now;
    }

    fn in_state(&self, now: Instant) -> f32 {
        now.saturating_duration_since(self.state_entered).as_secs_f32()
    }

    fn steer(&self, input: &BehaviorInput, target: &Detection) -> f32 {
        self.config.approach_kp * (input.center_x() - target.center.0)
    }

    fn goal_intake(&self) -> AccessoryMode {
        if self.config.intake_during_goal_search {
            AccessoryMode::Forward
        } else {
            AccessoryMode::Stop
        }
    }

    fn search_ball(&mut self, input: &BehaviorInput, now: Instant) -> BehaviorOutput {
        if input.largest(ObjectKind::Ball).is_some() {
            self.ball_centered = false;
            self.enter(BehaviorState::ApproachBall, now);
            return self.approach_ball(input, now);
        }

        //spin in place, then a short forward arc to widen the footprint
        let cfg = &self.config;
        let cycle = cfg.search_spin_s + cfg.search_drive_s;
        let t = if cycle > 0.0 { self.in_state(now) % cycle } else { 0.0 };

        if t < cfg.search_spin_s {
            BehaviorOutput::drive(0.0, 0.0, cfg.search_rotation_speed, AccessoryMode::Forward)
        } else {
            BehaviorOutput::drive(cfg.approach_speed, 0.0, cfg.search_drive_omega, AccessoryMode::Forward)
        }
    }

    fn approach_ball(&mut self, input: &BehaviorInput, now: Instant) -> BehaviorOutput {
        let ball = match input.largest(ObjectKind::Ball) {
            Some(ball) => *ball,
            None => {
                if self.ball_centered {
                    //vanished from the intake zone, so it went in
                    log::info!("Ball left the frame at the intake");
                    return self.ball_collected(input, now);
                }
                self.enter(BehaviorState::SearchBall, now);
                return self.search_ball(input, now);
            }
        };

        let cfg = &self.config;
        let near_bottom = ball.center.1 > input.frame_height * cfg.bottom_threshold;
        let centered = (ball.center.0 - input.center_x()).abs() < cfg.ball_center_tolerance;
        if near_bottom && centered {
            self.ball_centered = true;
        }

        let omega = self.steer(input, &ball);
        if ball.area > self.config.ball_close_area {
            let speed = self.config.approach_speed / 2.0;
            self.enter(BehaviorState::Collecting, now);
            return BehaviorOutput::drive(speed, 0.0, 0.0, AccessoryMode::Forward);
        }

        BehaviorOutput::drive(self.config.approach_speed, 0.0, omega, AccessoryMode::Forward)
    }

    fn collecting(&mut self, input: &BehaviorInput, now: Instant) -> BehaviorOutput {
        if self.in_state(now) > self.config.collecting_time_s {
            return self.ball_collected(input, now);
        }
        BehaviorOutput::drive(self.config.approach_speed, 0.0, 0.0, AccessoryMode::Forward)
    }

    fn ball_collected(&mut self, input: &BehaviorInput, now: Instant) -> BehaviorOutput {
        self.balls_collected += 1;
        self.ball_centered = false;
        log::info!("Collected {}/{}", self.balls_collected, self.config.max_balls);

        if self.balls_collected >= self.config.max_balls {
            self.enter(BehaviorState::SearchGoal, now);
        } else {
            self.enter(BehaviorState::SearchBall, now);
        }
        self.step(input, now)
    }

    fn search_goal(&mut self, input: &BehaviorInput, now: Instant) -> BehaviorOutput {
        let target = ObjectKind::Goal(self.config.target_goal);
        if input.largest(target).is_some() {
            self.goal_centered = false;
            self.enter(BehaviorState::ApproachGoal, now);
            return self.approach_goal(input, now);
        }
        BehaviorOutput::drive(0.0, 0.0, self.config.search_rotation_speed, self.goal_intake())
    }

    fn approach_goal(&mut self, input: &BehaviorInput, now: Instant) -> BehaviorOutput {
        let target = ObjectKind::Goal(self.config.target_goal);
        let goal = match input.largest(target) {
            Some(goal) => *goal,
            None => {
                self.enter(BehaviorState::SearchGoal, now);
                return self.search_goal(input, now);
            }
        };

        if (goal.center.0 - input.center_x()).abs() < self.config.goal_center_tolerance {
            self.goal_centered = true;
        }

        if self.goal_centered && goal.area > self.config.goal_close_area {
            self.enter(BehaviorState::Depositing, now);
            return self.depositing(input, now);
        }

        let omega = self.steer(input, &goal);
        BehaviorOutput::drive(self.config.approach_speed, 0.0, omega, self.goal_intake())
    }

    fn depositing(&mut self, input: &BehaviorInput, now: Instant) -> BehaviorOutput {
        if self.in_state(now) > self.config.deposit_time_s {
            log::info!("Deposited {} balls", self.balls_collected);
            self.balls_collected = 0;
            self.leave_start_heading = input.heading;
            self.enter(BehaviorState::LeaveGoal, now);
            return self.leave_goal(input, now);
        }
        //backing up pushes the balls onto the reversed roller
        BehaviorOutput::drive(self.config.deposit_backup_speed, 0.0, 0.0, AccessoryMode::Reverse)
    }

    fn leave_goal(&mut self, input: &BehaviorInput, now: Instant) -> BehaviorOutput {
        if self.leave_start_heading.is_none() {
            self.leave_start_heading = input.heading;
        }

        let turned = match (self.leave_start_heading, input.heading) {
            (Some(start), Some(heading)) => normalize_angle(heading - start).abs(),
            _ => 0.0,
        };

        if turned >= self.config.leave_turn_angle || self.in_state(now) > self.config.leave_turn_time_s {
            self.leave_start_heading = None;
            self.enter(BehaviorState::SearchBall, now);
            return self.search_ball(input, now);
        }

        BehaviorOutput::drive(0.0, 0.0, self.config.search_rotation_speed, AccessoryMode::Forward)
    }
}
