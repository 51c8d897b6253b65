pub mod actuator;
pub mod behavior;
pub mod command;
pub mod config;
pub mod control;
pub mod error;
pub mod ring_buffer;
pub mod robot;
pub mod sensor;
pub mod threads;
pub mod transport;

#[cfg(feature = "python")]
pub mod python;

pub use ring_buffer::RingBuffer;

pub use actuator::{AccessoryMode, ActuatorLink, MotionCommand};
pub use behavior::{
    BehaviorEngine, BehaviorInput, BehaviorOutput, BehaviorState,
    Detection, GoalColor, Motion, ObjectKind,
};
pub use command::{Command, CommandServer};
pub use config::AppConfig;
pub use control::{
    ControlLoop, ControllerStatus, DriftCompensator,
    HeadingSource, IntentSource, TickOutcome, VelocityIntent,
};
pub use error::{Error, Result};
pub use robot::Robot;
pub use sensor::{InertialSample, SensorLink, SensorSnapshot};
pub use transport::{MockTransport, SerialTransport, Transport};
