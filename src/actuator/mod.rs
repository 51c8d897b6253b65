pub mod protocol;
pub use protocol::*;

use std::time::Duration;

use crate::config::SerialConfig;
use crate::error::Result;
use crate::transport::{SerialTransport, Transport};

//writes to the two boards: drive motors on `motion`, intake motor on `accessory`
//all writes are fire-and-forget, no acknowledgement is read back
pub struct ActuatorLink{
    motion: Box<dyn Transport>,
    accessory: Box<dyn Transport>,
    last_accessory: Option<AccessoryMode>,
    write_failures: u64,
}

impl ActuatorLink{
    pub fn new(motion: Box<dyn Transport>, accessory: Box<dyn Transport>) -> Self{
        ActuatorLink{
            motion,
            accessory,
            last_accessory: None,
            write_failures: 0,
        }
    }

    //open the motion board; the accessory writer shares the sensor board's port
    pub fn connect(serial: &SerialConfig, accessory: Box<dyn Transport>) -> Result<Self>{
        let motion = SerialTransport::open(
            &serial.motion_port,
            serial.motion_baud,
            Duration::from_millis(serial.read_timeout_ms),
        )?;
        Ok(Self::new(Box::new(motion), accessory))
    }

    pub fn send_velocity(&mut self, vx: f32, vy: f32, omega: f32) -> Result<()>{
        let cmd = MotionCommand::Velocity{ vx, vy, omega };
        log::trace!("VEL {:.3} {:.3} {:.3}", vx, vy, omega);
        self.write_motion(&cmd)
    }

    //safe to repeat
    pub fn stop(&mut self) -> Result<()>{
        self.write_motion(&MotionCommand::Stop)
    }

    //send only when the mode changes; returns whether anything was written
    pub fn set_accessory(&mut self, mode: AccessoryMode) -> Result<bool>{
        if self.last_accessory == Some(mode){
            return Ok(false);
        }
        self.force_accessory(mode)?;
        Ok(true)
    }

    //send regardless of the cache (reconnect, safety reset)
    pub fn force_accessory(&mut self, mode: AccessoryMode) -> Result<()>{
        match self.accessory.send(&mode.to_bytes()){
            Ok(()) =>{
                //cache only what the board actually received
                self.last_accessory = Some(mode);
                log::info!("Accessory motor: {}", mode);
                Ok(())
            }
            Err(e) =>{
                self.write_failures += 1;
                self.last_accessory = None;
                Err(e)
            }
        }
    }

    pub fn accessory_mode(&self) -> Option<AccessoryMode>{
        self.last_accessory
    }

    pub fn write_failures(&self) -> u64{
        self.write_failures
    }

    fn write_motion(&mut self, cmd: &MotionCommand) -> Result<()>{
        let result = self.motion.send(&cmd.to_bytes());
        if result.is_err(){
            self.write_failures += 1;
        }
        result
    }
}

#[cfg(test)]
mod tests{
    use super::*;
    use crate::transport::MockTransport;

    fn create_link() -> (ActuatorLink, MockTransport, MockTransport){
        let motion = MockTransport::new();
        let accessory = MockTransport::new();
        let link = ActuatorLink::new(Box::new(motion.clone()), Box::new(accessory.clone()));
        (link, motion, accessory)
    }

    #[test]
    fn test_send_velocity_and_stop(){
        let (mut link, motion, _) = create_link();
        link.send_velocity(0.5, 0.0, -1.0).unwrap();
        link.stop().unwrap();
        link.stop().unwrap();
        assert_eq!(motion.written_lines(), vec!["VEL,0.500,0.000,-1.000", "STOP", "STOP"]);
    }

    #[test]
    fn test_accessory_dedup(){
        let (mut link, _, accessory) = create_link();
        assert!(link.set_accessory(AccessoryMode::Forward).unwrap());
        assert!(!link.set_accessory(AccessoryMode::Forward).unwrap());
        assert!(link.set_accessory(AccessoryMode::Stop).unwrap());
        assert_eq!(accessory.written_lines(), vec!["R", "S"]);
    }

    #[test]
    fn test_force_accessory_bypasses_cache(){
        let (mut link, _, accessory) = create_link();
        link.set_accessory(AccessoryMode::Stop).unwrap();
        link.force_accessory(AccessoryMode::Stop).unwrap();
        assert_eq!(accessory.written_lines(), vec!["S", "S"]);
    }

    #[test]
    fn test_failed_write_not_cached(){
        let (mut link, motion, accessory) = create_link();
        accessory.set_fail_writes(true);
        assert!(link.set_accessory(AccessoryMode::Forward).is_err());
        assert_eq!(link.accessory_mode(), None);

        accessory.set_fail_writes(false);
        assert!(link.set_accessory(AccessoryMode::Forward).unwrap());

        motion.set_fail_writes(true);
        assert!(link.stop().is_err());
        assert_eq!(link.write_failures(), 2);
    }
}
