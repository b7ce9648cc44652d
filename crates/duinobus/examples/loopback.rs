//! Host and device in one process, joined by a socket pair.
//!
//! Run with:
//!   cargo run --example loopback

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use duinobus::bus::{Bus, BusConfig, Device, Dispatcher, Severity};
use duinobus::frame::{Packet, PING};
use duinobus::transport::ByteStream;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (device_end, host_end) = ByteStream::pair()?;

    let stop = Arc::new(AtomicBool::new(false));
    let device_thread = {
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || -> duinobus::bus::Result<()> {
            let mut device = Device::new(device_end, Dispatcher::with_core())?
                .with_poll_interval(Duration::from_millis(50));
            device.log(Severity::Info, "loopback device up")?;
            device.send_event(vec![0x01u8])?;
            device.serve(&stop)
        })
    };

    let bus = Bus::connect(host_end, BusConfig::default())?;

    for seq in 0..3u8 {
        let started = Instant::now();
        let reply = bus.send_command(&Packet::new(PING, vec![seq]))?;
        eprintln!("ping {seq}: {:?} in {:?}", reply.payload.as_ref(), started.elapsed());
    }

    if let Some(event) = bus.recv_event(Duration::from_secs(1))? {
        eprintln!("event: {:?}", event.payload.as_ref());
    }

    stop.store(true, Ordering::Release);
    bus.close()?;
    device_thread.join().map_err(|_| "device thread panicked")??;
    Ok(())
}
