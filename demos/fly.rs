//! Main processing loop: connect to a live drone, print telemetry, fly a
//! short scripted hop.
//!
//! Usage: cargo run --example fly
//!
//! Requires: connected to the drone's WiFi (SSID `TELLO-xxxxxx`).

use std::process;
use std::thread;
use std::time::Duration;

use skylark::transport::DEFAULT_ADDR;
use skylark::{ConnError, ConnectionState, ControlAxis, Drone, Gains};

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), ConnError> {
    let drone = Drone::new(DEFAULT_ADDR)?;

    // Telemetry trace.
    drone
        .connection_state()
        .subscribe(|s| println!("[link] {s:?}"));
    drone
        .sensors()
        .flight_state
        .subscribe(|s| println!("[flight] {s:?}"));
    drone.sensors().flight_data.subscribe(|d| {
        println!(
            "[data] height {:.1} m  battery {}%",
            f64::from(d.height) / 10.0,
            d.battery_percentage
        );
    });
    drone
        .sensors()
        .proximity
        .subscribe(|m| println!("[sonar] {m:.2} m"));
    drone
        .controller()
        .state()
        .subscribe(|s| println!("[ctrl] {s:?}"));

    println!("Connecting to {DEFAULT_ADDR}...");
    drone.connect()?;

    // Wait for the handshake before commanding anything.
    let mut waited = 0;
    while drone.connection_state().get() != Some(ConnectionState::Connected) {
        thread::sleep(Duration::from_millis(100));
        waited += 100;
        if waited > 10_000 {
            eprintln!("no conn_ack from the drone; is the WiFi up?");
            return Ok(());
        }
    }

    println!("Connected. Taking off...");
    drone.take_off();
    thread::sleep(Duration::from_secs(5));

    // One metre forward, using visual odometry from where we are now.
    drone.set_origin_to_vo();
    drone
        .set_controller_gains(ControlAxis::X, Gains::p(0.6), 0.08)
        .ok();
    println!("Going to x = 1.0 m...");
    drone.go_to(Some(1.0), Some(0.0), None);
    thread::sleep(Duration::from_secs(8));

    println!("Hover, then land.");
    drone.hover();
    thread::sleep(Duration::from_secs(2));
    drone.land();
    thread::sleep(Duration::from_secs(5));

    drone.disconnect();
    Ok(())
}
