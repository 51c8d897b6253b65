use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::Command;
use crate::config::CommandConfig;
use crate::control::{DriftCompensator, IntentSource};
use crate::error::{Error, Result};

const MAX_DATAGRAM: usize = 512;

//datagram listener for the operator channel
pub struct CommandServer{
    socket: UdpSocket,
    compensator: Arc<DriftCompensator>,
    reply_status: bool,
    running: Arc<AtomicBool>,
}

impl CommandServer{
    pub fn bind<A: ToSocketAddrs>(addr: A, compensator: Arc<DriftCompensator>, config: &CommandConfig) -> Result<Self>{
        let socket = UdpSocket::bind(addr)?;
        //bounded so the loop can see the running flag
        socket.set_read_timeout(Some(config.recv_timeout()))?;
        log::info!("Command listener on {}", socket.local_addr()?);

        Ok(CommandServer{
            socket,
            compensator,
            reply_status: config.reply_status,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr>{
        Ok(self.socket.local_addr()?)
    }

    //decode one datagram and apply it; returns the reply to send back, if any
    pub fn handle_datagram(&self, data: &[u8]) -> Option<String>{
        let text = match std::str::from_utf8(data){
            Ok(text) => text,
            Err(_) =>{
                log::warn!("Dropping non UTF-8 datagram ({} bytes)", data.len());
                return None;
            }
        };

        let command = match Command::parse(text){
            Ok(command) => command,
            Err(e) =>{
                log::warn!("Rejected command: {}", e);
                return None;
            }
        };
        log::debug!("Command: {:?}", command);

        match command{
            Command::Velocity(intent) =>{
                let result = self.compensator.set_intent(IntentSource::Operator, intent.vx, intent.vy, intent.omega);
                if let Err(e) = result{
                    log::warn!("VEL ignored: {}", e);
                }
                None
            }
            Command::Stop =>{
                self.compensator.emergency_stop();
                None
            }
            Command::Accessory(mode) =>{
                if let Err(e) = self.compensator.set_accessory(IntentSource::Operator, mode){
                    log::warn!("COLLECTOR ignored: {}", e);
                }
                None
            }
            Command::ResetHeading =>{
                self.compensator.reset_heading();
                None
            }
            Command::Status =>{
                let status = self.compensator.status().to_string();
                log::info!("\n{}", status);
                if self.reply_status{ Some(status) }else{ None }
            }
        }
    }

    pub fn start(self) -> Result<(JoinHandle<()>, Arc<AtomicBool>)>{
        let running = Arc::clone(&self.running);
        self.running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("command-server".to_string())
            .spawn(move ||{
                self.run_loop();
            })
            .map_err(|e| Error::Other(format!("Failed to spawn command server: {}", e)))?;

        Ok((handle, running))
    }

    fn run_loop(&self){
        let mut buf = [0u8; MAX_DATAGRAM];

        while self.running.load(Ordering::SeqCst){
            match self.socket.recv_from(&mut buf){
                Ok((n, peer)) =>{
                    if let Some(reply) = self.handle_datagram(&buf[..n]){
                        if let Err(e) = self.socket.send_to(reply.as_bytes(), peer){
                            log::warn!("Failed to reply to {}: {}", peer, e);
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>{}
                Err(e) =>{
                    log::warn!("Command socket error: {}", e);
                    thread::sleep(Duration::from_millis(10));
                }
            }
        }

        log::info!("Command listener exiting");
    }
}

pub fn stop_server(running: &Arc<AtomicBool>){
    running.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests{
    use super::*;
    use crate::actuator::AccessoryMode;
    use crate::config::ControlConfig;
    use crate::control::compensator::tests::{harness, Harness};
    use crate::control::{TickOutcome, VelocityIntent};
    use crate::threads::join_with_timeout;

    fn create_server() -> (CommandServer, Arc<DriftCompensator>, Harness){
        let h = harness(ControlConfig::default());
        let compensator = Arc::clone(&h.compensator);
        let server = CommandServer::bind("127.0.0.1:0", Arc::clone(&compensator), &CommandConfig::default()).unwrap();
        (server, compensator, h)
    }

    #[test]
    fn test_velocity_sets_intent(){
        let (server, compensator, _h) = create_server();
        assert!(server.handle_datagram(b"VEL,1.0,0.0,0.0").is_none());
        assert_eq!(compensator.intent(), VelocityIntent::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_malformed_has_no_effect(){
        let (server, compensator, h) = create_server();
        server.handle_datagram(b"VEL,1.0,0.0,0.0");
        server.handle_datagram(b"VEL,2.0,zero,0.0");
        server.handle_datagram(b"COLLECTOR,maybe");
        server.handle_datagram(&[0xff, 0xfe]);
        assert_eq!(compensator.intent(), VelocityIntent::new(1.0, 0.0, 0.0));
        assert!(h.accessory.written().is_empty());
    }

    #[test]
    fn test_collector_dedup(){
        let (server, compensator, h) = create_server();
        server.handle_datagram(b"COLLECTOR,forward");
        server.handle_datagram(b"COLLECTOR,forward");
        assert_eq!(h.accessory.written_lines(), vec!["R"]);
        assert_eq!(compensator.status().accessory, Some(AccessoryMode::Forward));
    }

    #[test]
    fn test_stop_then_velocity(){
        let (server, compensator, h) = create_server();
        server.handle_datagram(b"VEL,1.0,0.0,0.5");
        server.handle_datagram(b"STOP");
        assert_eq!(compensator.tick(), TickOutcome::Stopped);

        server.handle_datagram(b"VEL,0.4,0.0,0.5");
        assert_eq!(compensator.tick(), TickOutcome::Sent(VelocityIntent::new(0.4, 0.0, 0.5)));
        assert_eq!(h.motion.written_lines(), vec!["STOP", "STOP", "VEL,0.400,0.000,0.500"]);
    }

    #[test]
    fn test_operator_rejected_in_autonomous_mode(){
        let (server, compensator, _h) = create_server();
        compensator.set_authority(IntentSource::Autonomous);
        server.handle_datagram(b"VEL,1.0,0.0,0.0");
        assert_eq!(compensator.intent(), VelocityIntent::default());
    }

    #[test]
    fn test_status_reply(){
        let (server, _compensator, _h) = create_server();
        let reply = server.handle_datagram(b"STATUS").unwrap();
        assert!(reply.contains("Controller Status"));
    }

    #[test]
    fn test_udp_round_trip(){
        let (server, compensator, _h) = create_server();
        let addr = server.local_addr().unwrap();
        let (handle, running) = server.start().unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        client.send_to(b"VEL,0.5,0.25,0.0", addr).unwrap();
        client.send_to(b"STATUS", addr).unwrap();

        let mut buf = [0u8; 2048];
        let (n, _) = client.recv_from(&mut buf).unwrap();
        let reply = std::str::from_utf8(&buf[..n]).unwrap();
        assert!(reply.contains("vx=0.50"));
        assert_eq!(compensator.intent(), VelocityIntent::new(0.5, 0.25, 0.0));

        stop_server(&running);
        assert!(join_with_timeout(handle, Duration::from_secs(2), "command-server"));
    }
}
