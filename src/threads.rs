use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

//join a worker that has been told to stop, giving up after `timeout`
//returns false if the thread was still running and got detached
pub fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, name: &str) -> bool{
    let deadline = Instant::now() + timeout;

    while !handle.is_finished(){
        if Instant::now() >= deadline{
            log::warn!("{} did not stop within {:?}, detaching", name, timeout);
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }

    if handle.join().is_err(){
        log::error!("{} panicked", name);
    }
    return true;
}
