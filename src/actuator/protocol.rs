use std::fmt;
use std::str::FromStr;

use crate::error::Error;

//motion board commands, newline terminated text
//  VEL,<vx>,<vy>,<omega>\n   fixed 3 decimals, m/s m/s rad/s
//  STOP\n
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionCommand{
    Velocity{ vx: f32, vy: f32, omega: f32 },
    Stop,
}

impl MotionCommand{
    pub fn to_bytes(&self) -> Vec<u8>{
        match self{
            MotionCommand::Velocity{ vx, vy, omega } =>{
                format!("VEL,{:.3},{:.3},{:.3}\n", vx, vy, omega).into_bytes()
            }
            MotionCommand::Stop => b"STOP\n".to_vec(),
        }
    }
}

//ball intake/deposit motor on the sensor board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessoryMode{
    Forward,
    Reverse,
    Stop,
}

impl AccessoryMode{
    //firmware letters; the motor is mounted inverted so forward/reverse are swapped
    pub fn code(&self) -> u8{
        match self{
            AccessoryMode::Forward => b'R',
            AccessoryMode::Reverse => b'F',
            AccessoryMode::Stop => b'S',
        }
    }

    pub fn to_bytes(&self) -> [u8; 2]{
        [self.code(), b'\n']
    }

    pub fn as_str(&self) -> &'static str{
        match self{
            AccessoryMode::Forward => "forward",
            AccessoryMode::Reverse => "reverse",
            AccessoryMode::Stop => "stop",
        }
    }
}

impl fmt::Display for AccessoryMode{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result{
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessoryMode{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err>{
        match s.trim().to_ascii_lowercase().as_str(){
            "forward" => Ok(AccessoryMode::Forward),
            "reverse" => Ok(AccessoryMode::Reverse),
            "stop" => Ok(AccessoryMode::Stop),
            other => Err(Error::Command(format!("unknown accessory mode {:?}", other))),
        }
    }
}
