/**
 * Robot
 *
 * Wires the pieces together:
 * 1. Sensor link reader on the inertial board port
 * 2. Actuator link: motion board plus a cloned handle for the intake motor
 * 3. Drift compensator ticked by the control loop thread
 * 4. Optional datagram command listener (operator mode)
 * 5. Behavior engine fed by the vision pipeline (autonomous mode)
 *
 * Shutdown always stops the drive and the intake before any port closes.
 */

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::actuator::{AccessoryMode, ActuatorLink};
use crate::behavior::{BehaviorEngine, BehaviorInput, BehaviorState, Detection, Motion};
use crate::command::server::stop_server;
use crate::command::CommandServer;
use crate::config::AppConfig;
use crate::control::{ControlLoop, ControllerStatus, DriftCompensator, HeadingSource, IntentSource};
use crate::error::Result;
use crate::sensor::SensorLink;
use crate::threads::join_with_timeout;
use crate::transport::{SerialTransport, Transport};

struct CommandHandle {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

pub struct Robot {
    config: AppConfig,
    sensors: Arc<SensorLink>,
    compensator: Arc<DriftCompensator>,
    control: Mutex<Option<ControlLoop>>,
    command: Mutex<Option<CommandHandle>>,
    behavior: Mutex<BehaviorEngine>,
    shut_down: AtomicBool,
}

impl Robot {
    /// Open both boards and start the reader and control threads.
    ///
    /// Fails with a connection error if either port cannot be opened.
    pub fn open(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let settle = Duration::from_millis(config.serial.settle_ms);
        let read_timeout = Duration::from_millis(config.serial.read_timeout_ms);

        let sensor_port = SerialTransport::open(&config.serial.sensor_port, config.serial.sensor_baud, read_timeout)?;
        //the intake motor hangs off the sensor board
        let accessory_port = sensor_port.try_clone()?;
        let motion = ActuatorLink::connect(&config.serial, Box::new(accessory_port))?;

        //boards reset when the port opens
        thread::sleep(settle);

        Self::assemble(config, Box::new(sensor_port), motion)
    }

    /// Build on already opened transports
    pub fn from_transports(
        config: AppConfig,
        sensor: Box<dyn Transport>,
        accessory: Box<dyn Transport>,
        motion: Box<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        Self::assemble(config, sensor, ActuatorLink::new(motion, accessory))
    }

    fn assemble(config: AppConfig, sensor: Box<dyn Transport>, actuators: ActuatorLink) -> Result<Self> {
        let sensors = Arc::new(SensorLink::start(sensor, &config.sensor)?);
        let heading: Arc<dyn HeadingSource> = Arc::clone(&sensors) as Arc<dyn HeadingSource>;
        let compensator = Arc::new(DriftCompensator::new(heading, actuators, &config.control));

        //known intake state after connect
        compensator.emergency_stop();

        let control = ControlLoop::spawn(Arc::clone(&compensator), config.control.period())?;
        let behavior = BehaviorEngine::new(config.behavior.clone());

        Ok(Robot {
            config,
            sensors,
            compensator,
            control: Mutex::new(Some(control)),
            command: Mutex::new(None),
            behavior: Mutex::new(behavior),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn compensator(&self) -> &Arc<DriftCompensator> {
        &self.compensator
    }

    pub fn sensors(&self) -> &Arc<SensorLink> {
        &self.sensors
    }

    /// Start the datagram listener on the configured address
    pub fn serve_commands(&self) -> Result<SocketAddr> {
        self.serve_commands_on(&self.config.command.bind)
    }

    pub fn serve_commands_on(&self, bind: &str) -> Result<SocketAddr> {
        let mut command = self.command.lock();
        if let Some(existing) = command.take() {
            stop_server(&existing.running);
            join_with_timeout(existing.handle, self.config.sensor.join_timeout(), "command-server");
        }

        let server = CommandServer::bind(bind, Arc::clone(&self.compensator), &self.config.command)?;
        let addr = server.local_addr()?;
        let (handle, running) = server.start()?;
        *command = Some(CommandHandle { handle, running });
        Ok(addr)
    }

    /// Hand control to the behavior engine and begin a game
    pub fn start_game(&self) {
        self.compensator.set_authority(IntentSource::Autonomous);
        self.behavior.lock().start_game(Instant::now());
    }

    /// End the game, stop driving and the intake, return control to the operator
    pub fn stop_game(&self) {
        self.behavior.lock().stop_game();
        self.release_autonomy();
    }

    fn release_autonomy(&self) {
        if let Err(e) = self.compensator.halt(IntentSource::Autonomous) {
            log::debug!("Halt skipped: {}", e);
        }
        if let Err(e) = self.compensator.set_accessory(IntentSource::Autonomous, AccessoryMode::Stop) {
            log::warn!("Failed to stop intake: {}", e);
        }
        self.compensator.set_authority(IntentSource::Operator);
    }

    pub fn behavior_state(&self) -> BehaviorState {
        self.behavior.lock().state()
    }

    pub fn balls_collected(&self) -> u32 {
        self.behavior.lock().balls_collected()
    }

    /// Feed one camera frame of detections through the behavior engine and
    /// apply its output. Returns the state after the update.
    pub fn update_behavior(&self, detections: Vec<Detection>, frame_width: f32, frame_height: f32) -> Result<BehaviorState> {
        self.update_behavior_at(detections, frame_width, frame_height, Instant::now())
    }

    pub fn update_behavior_at(
        &self,
        detections: Vec<Detection>,
        frame_width: f32,
        frame_height: f32,
        now: Instant,
    ) -> Result<BehaviorState> {
        let reading = self.sensors.snapshot();
        let heading = if self.sensors.is_stale_at(&reading, now) {
            None
        } else {
            Some(reading.heading)
        };
        let input = BehaviorInput {
            detections,
            frame_width,
            frame_height,
            heading,
        };

        let mut engine = self.behavior.lock();
        let was_active = engine.state() != BehaviorState::Idle;
        let output = engine.update(&input, now);
        let state = engine.state();
        drop(engine);

        if !was_active {
            return Ok(state);
        }

        match output.motion {
            Motion::Drive(intent) => {
                self.compensator
                    .set_intent_at(IntentSource::Autonomous, intent, now)?;
            }
            Motion::Halt => self.compensator.halt(IntentSource::Autonomous)?,
            Motion::Hold => {}
        }
        if let Some(mode) = output.accessory {
            self.compensator.set_accessory(IntentSource::Autonomous, mode)?;
        }

        if state == BehaviorState::Idle {
            //game clock ran out
            self.compensator.set_authority(IntentSource::Operator);
        }
        Ok(state)
    }

    pub fn status(&self) -> ControllerStatus {
        self.compensator.status()
    }

    /// Stop every worker, then stop the drive and intake, then close the
    /// sensor port. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("Shutting down");
        let timeout = self.config.sensor.join_timeout();

        if let Some(command) = self.command.lock().take() {
            stop_server(&command.running);
            join_with_timeout(command.handle, timeout, "command-server");
        }
        if let Some(mut control) = self.control.lock().take() {
            control.stop(timeout);
        }

        self.compensator.emergency_stop();
        self.sensors.shutdown();
        log::info!("Shutdown complete");
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        self.shutdown();
    }
}
