use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::DriftCompensator;
use crate::error::{Error, Result};
use crate::threads::join_with_timeout;

//fixed-rate driver for DriftCompensator::tick
pub struct ControlLoop{
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ControlLoop{
    pub fn spawn(compensator: Arc<DriftCompensator>, period: Duration) -> Result<Self>{
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("control-loop".to_string())
            .spawn(move || run_loop(compensator, thread_running, period))
            .map_err(|e| Error::Other(format!("Failed to spawn control loop: {}", e)))?;

        log::info!("Control loop started at {:.1} Hz", 1.0 / period.as_secs_f32());
        Ok(ControlLoop{ running, handle: Some(handle) })
    }

    pub fn is_running(&self) -> bool{
        self.running.load(Ordering::SeqCst)
    }

    //returns false if the thread had to be detached
    pub fn stop(&mut self, timeout: Duration) -> bool{
        self.running.store(false, Ordering::SeqCst);
        match self.handle.take(){
            Some(handle) => join_with_timeout(handle, timeout, "control-loop"),
            None => true,
        }
    }
}

impl Drop for ControlLoop{
    fn drop(&mut self){
        self.stop(Duration::from_secs(1));
    }
}

fn run_loop(compensator: Arc<DriftCompensator>, running: Arc<AtomicBool>, period: Duration){
    let mut next = Instant::now();

    while running.load(Ordering::SeqCst){
        compensator.tick();

        next += period;
        let now = Instant::now();
        if next > now{
            thread::sleep(next - now);
        }else{
            //overran, don't try to catch up with a burst
            next = now;
        }
    }

    log::info!("Control loop exiting");
}
