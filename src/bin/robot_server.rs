/**
 * Robot Server Binary
 *
 * Runs the operator-mode robot:
 * 1. Opens the sensor and motion boards
 * 2. Starts the telemetry reader and the control loop
 * 3. Listens for datagram commands (VEL, STOP, COLLECTOR, RESET_HEADING, STATUS)
 * 4. On Ctrl-C stops the drive and the intake before closing the ports
 *
 * Usage: robot_server [-c|--config <path>]
 * Without a config file the built-in defaults are used.
 */

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use proustite::{AppConfig, Error, Result, Robot};

fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }
    None
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = match &config_path {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.logging.level.as_str())).init();

    println!("==============================================");
    println!("  Proustite Robot Server");
    println!("==============================================");
    println!("  Config: {}", config_path.as_deref().unwrap_or("(defaults)"));
    println!("  Sensor: {} @ {}", config.serial.sensor_port, config.serial.sensor_baud);
    println!("  Motion: {} @ {}", config.serial.motion_port, config.serial.motion_baud);
    println!("  Listen: {}", config.command.bind);
    println!("==============================================\n");

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move ||{
        log::info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let robot = Robot::open(config)?;
    let addr = robot.serve_commands()?;
    log::info!("Robot ready, commands on {}. Press Ctrl-C to stop.", addr);

    while running.load(Ordering::SeqCst){
        thread::sleep(Duration::from_millis(100));
    }

    robot.shutdown();
    println!("Goodbye!");
    Ok(())
}
