use crate::actuator::AccessoryMode;
use crate::control::VelocityIntent;
use crate::error::{Error, Result};

//operator datagrams, one per packet, comma separated
//  VEL,<vx>,<vy>,<omega>
//  STOP
//  COLLECTOR,<forward|reverse|stop>
//  RESET_HEADING
//  STATUS
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command{
    Velocity(VelocityIntent),
    Stop,
    Accessory(AccessoryMode),
    ResetHeading,
    Status,
}

impl Command{
    pub fn parse(text: &str) -> Result<Self>{
        let text = text.trim();
        let fields: Vec<&str> = text.split(',').map(str::trim).collect();

        match fields.as_slice(){
            ["VEL", vx, vy, omega] =>{
                let intent = VelocityIntent::new(parse_float(vx)?, parse_float(vy)?, parse_float(omega)?);
                Ok(Command::Velocity(intent))
            }
            ["STOP"] => Ok(Command::Stop),
            ["COLLECTOR", mode] => Ok(Command::Accessory(mode.parse()?)),
            ["RESET_HEADING"] => Ok(Command::ResetHeading),
            ["STATUS"] => Ok(Command::Status),
            [verb @ ("VEL" | "STOP" | "COLLECTOR" | "RESET_HEADING" | "STATUS"), ..] =>{
                Err(Error::Command(format!("wrong field count for {}: {:?}", verb, text)))
            }
            _ => Err(Error::Command(format!("unknown command {:?}", text))),
        }
    }
}

fn parse_float(field: &str) -> Result<f32>{
    let value: f32 = field
        .parse()
        .map_err(|_| Error::Command(format!("not a number: {:?}", field)))?;
    if !value.is_finite(){
        return Err(Error::Command(format!("not a finite number: {:?}", field)));
    }
    Ok(value)
}
