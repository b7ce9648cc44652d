#![cfg(unix)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use duinobus_bus::{
    log_packet, Bus, BusConfig, BusError, Device, Dispatcher, HandlerContext, PacketHandler,
    PacketReader, PacketWriter, Severity,
};
use duinobus_frame::{Packet, DEBUG, EVENT, LOG, PING, USER_COMMAND_START};
use duinobus_transport::{ByteStream, ByteTransport};

const WAIT: Duration = Duration::from_secs(2);

fn fast_config() -> BusConfig {
    BusConfig::default().with_poll_interval(Duration::from_millis(50))
}

/// Runs a core device on the far end of a socket pair until the bus goes away.
fn spawn_device(dispatcher: Dispatcher) -> (Bus<ByteStream>, thread::JoinHandle<()>, Arc<AtomicBool>) {
    let (host_end, device_end) = ByteStream::pair().expect("socketpair");
    let stop = Arc::new(AtomicBool::new(false));
    let device_stop = Arc::clone(&stop);
    let handle = thread::spawn(move || {
        let mut device = Device::new(device_end, dispatcher)
            .expect("device")
            .with_poll_interval(Duration::from_millis(20));
        device.serve(&device_stop).expect("device serve");
    });
    let bus = Bus::connect(host_end, fast_config()).expect("bus open");
    (bus, handle, stop)
}

struct Echo;

impl PacketHandler for Echo {
    fn handle(&mut self, packet: &Packet, _ctx: &mut HandlerContext) -> Option<Packet> {
        (packet.command >= USER_COMMAND_START).then(|| packet.clone())
    }
}

#[test]
fn ping_round_trip() {
    let (bus, handle, stop) = spawn_device(Dispatcher::with_core());

    let response = bus
        .send_command_and_await_response(&Packet::new(PING, vec![1u8, 2, 3]), WAIT)
        .unwrap();
    assert_eq!(response, Packet::new(PING, vec![1u8, 2, 3]));

    let mut payload = vec![0xc0u8, 0xdb];
    payload.extend(0..=0x40);
    let response = bus
        .send_command_and_await_response(&Packet::new(PING, payload.clone()), WAIT)
        .unwrap();
    assert_eq!(&response.payload[..], &payload[..]);

    stop.store(true, Ordering::Release);
    bus.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn sequential_commands_get_matching_responses() {
    let mut dispatcher = Dispatcher::with_core();
    dispatcher.add(Echo);
    let (bus, handle, stop) = spawn_device(dispatcher);

    for n in 0..20u8 {
        let request = Packet::new(USER_COMMAND_START + (n % 4), vec![n; n as usize]);
        let response = bus.send_command(&request).unwrap();
        assert_eq!(response, request);
    }

    stop.store(true, Ordering::Release);
    drop(bus);
    handle.join().unwrap();
}

#[test]
fn concurrent_callers_are_serialized() {
    let mut dispatcher = Dispatcher::with_core();
    dispatcher.add(Echo);
    let (bus, handle, stop) = spawn_device(dispatcher);
    let bus = Arc::new(bus);

    let callers: Vec<_> = (0..4u8)
        .map(|id| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                for seq in 0..10u8 {
                    let request = Packet::new(USER_COMMAND_START, vec![id, seq]);
                    let response = bus.send_command_and_await_response(&request, WAIT).unwrap();
                    assert_eq!(response, request);
                }
            })
        })
        .collect();
    for caller in callers {
        caller.join().unwrap();
    }

    stop.store(true, Ordering::Release);
    bus.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn timeout_leaves_bus_usable() {
    // No Echo handler, so user commands go unanswered.
    let (bus, handle, stop) = spawn_device(Dispatcher::with_core());

    let start = Instant::now();
    let err = bus
        .send_command_and_await_response(&Packet::empty(USER_COMMAND_START), Duration::from_millis(100))
        .unwrap_err();
    assert!(matches!(err, BusError::Timeout(t) if t == Duration::from_millis(100)));
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert!(bus.is_open());

    let response = bus.send_command_and_await_response(&Packet::empty(PING), WAIT).unwrap();
    assert_eq!(response.command, PING);

    stop.store(true, Ordering::Release);
    bus.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn late_response_is_not_mistaken_for_the_next_one() {
    let (host_end, device_end) = ByteStream::pair().unwrap();
    let bus = Bus::connect(host_end, fast_config()).unwrap();
    let mut device_reader = PacketReader::new(device_end.try_clone().unwrap());
    let mut device_writer = PacketWriter::new(device_end);

    let err = bus
        .send_command_and_await_response(&Packet::empty(USER_COMMAND_START), Duration::from_millis(50))
        .unwrap_err();
    assert!(err.is_timeout());
    let first = device_reader.read_packet(WAIT).unwrap().unwrap();
    assert_eq!(first.command, USER_COMMAND_START);

    // Answer the first request late, then give the bus time to queue it.
    device_writer.send(&Packet::new(USER_COMMAND_START, vec![1u8])).unwrap();
    thread::sleep(Duration::from_millis(100));

    let device = thread::spawn(move || {
        let second = device_reader.read_packet(WAIT).unwrap().unwrap();
        device_writer.send(&Packet::new(second.command, vec![2u8])).unwrap();
    });
    let response = bus
        .send_command_and_await_response(&Packet::empty(USER_COMMAND_START + 1), WAIT)
        .unwrap();
    assert_eq!(&response.payload[..], &[2]);
    device.join().unwrap();
}

#[test]
fn log_packets_never_reach_the_response_queue() {
    let (host_end, device_end) = ByteStream::pair().unwrap();
    let bus = Bus::connect(host_end, fast_config()).unwrap();
    let mut device_reader = PacketReader::new(device_end.try_clone().unwrap());
    let mut device_writer = PacketWriter::new(device_end);

    let device = thread::spawn(move || {
        let request = device_reader.read_packet(WAIT).unwrap().unwrap();
        device_writer.send(&log_packet(Severity::Info, "handling ping")).unwrap();
        device_writer.send(&log_packet(Severity::Warning, "still handling")).unwrap();
        device_writer.send(&Packet::new(LOG, vec![0xffu8, 2, b'x', 0])).unwrap();
        device_writer.send(&request).unwrap();
    });

    let response = bus.send_command_and_await_response(&Packet::new(PING, vec![7u8]), WAIT).unwrap();
    assert_eq!(response, Packet::new(PING, vec![7u8]));
    device.join().unwrap();

    assert!(bus.recv_unsolicited(Duration::from_millis(100)).unwrap().is_none());
}

#[test]
fn events_are_queued_separately() {
    let (host_end, device_end) = ByteStream::pair().unwrap();
    let bus = Bus::connect(host_end, fast_config()).unwrap();
    let mut device = Device::new(device_end, Dispatcher::with_core()).unwrap();

    device.send_event(vec![1u8]).unwrap();
    device.send_event(vec![2u8]).unwrap();

    let first = bus.recv_event(WAIT).unwrap().unwrap();
    let second = bus.recv_event(WAIT).unwrap().unwrap();
    assert_eq!(first, Packet::new(EVENT, vec![1u8]));
    assert_eq!(second, Packet::new(EVENT, vec![2u8]));
    assert!(bus.recv_event(Duration::from_millis(50)).unwrap().is_none());
    assert!(bus.recv_unsolicited(Duration::from_millis(50)).unwrap().is_none());
}

#[test]
fn full_event_queue_drops_new_arrivals() {
    let (host_end, device_end) = ByteStream::pair().unwrap();
    let config = BusConfig {
        queue_capacity: 2,
        ..fast_config()
    };
    let bus = Bus::connect(host_end, config).unwrap();
    let mut device = Device::new(device_end, Dispatcher::new()).unwrap();

    for n in 0..5u8 {
        device.send_event(vec![n]).unwrap();
    }
    thread::sleep(Duration::from_millis(200));

    assert_eq!(&bus.recv_event(WAIT).unwrap().unwrap().payload[..], &[0]);
    assert_eq!(&bus.recv_event(WAIT).unwrap().unwrap().payload[..], &[1]);
    assert!(bus.recv_event(Duration::from_millis(50)).unwrap().is_none());
}

#[test]
fn single_slot_queue_holds_an_event_nobody_is_waiting_for() {
    let (host_end, device_end) = ByteStream::pair().unwrap();
    let config = BusConfig {
        queue_capacity: 1,
        ..fast_config()
    };
    let bus = Bus::connect(host_end, config).unwrap();
    let mut device = Device::new(device_end, Dispatcher::new()).unwrap();

    device.send_event(vec![7u8]).unwrap();
    thread::sleep(Duration::from_millis(200));

    assert_eq!(bus.recv_event(WAIT).unwrap(), Some(Packet::new(EVENT, vec![7u8])));
}

#[test]
fn unusable_config_is_rejected_at_open() {
    let zero_queue = BusConfig {
        queue_capacity: 0,
        ..fast_config()
    };
    let zero_poll = BusConfig {
        poll_interval: Duration::ZERO,
        ..fast_config()
    };

    for config in [zero_queue, zero_poll] {
        let (host_end, _device_end) = ByteStream::pair().unwrap();
        let bus = Bus::new(config);
        assert!(matches!(
            bus.open(host_end),
            Err(BusError::InvalidConfig { .. })
        ));
        assert!(!bus.is_open());
        assert!(matches!(bus.recv_event(Duration::ZERO), Err(BusError::NotOpen)));
    }
}

#[test]
fn corrupted_frames_are_skipped() {
    let (host_end, mut device_end) = ByteStream::pair().unwrap();
    let bus = Bus::connect(host_end, fast_config()).unwrap();

    let garbage = [
        0x55, 0xc0, 0x01, 0xc0, // too small
        0xc0, 0x01, 0x02, 0x03, 0x49, 0xc0, // bad checksum
        0xc0, 0x10, 0x02, 0x03, 0xc0, // cut short, so its last byte is read as the checksum
    ];
    for byte in garbage {
        device_end.write_byte(byte).unwrap();
    }
    for byte in Packet::new(EVENT, vec![0x42u8]).encode() {
        device_end.write_byte(byte).unwrap();
    }

    let event = bus.recv_event(WAIT).unwrap().unwrap();
    assert_eq!(&event.payload[..], &[0x42]);
    assert!(bus.recv_unsolicited(Duration::from_millis(50)).unwrap().is_none());
}

#[test]
fn debug_command_round_trip() {
    let (bus, handle, stop) = spawn_device(Dispatcher::with_core());
    let response = bus
        .send_command_and_await_response(&Packet::new(DEBUG, vec![1u8, 0, 0, 0]), WAIT)
        .unwrap();
    assert_eq!(response, Packet::new(DEBUG, vec![1u8, 0, 0, 0]));

    stop.store(true, Ordering::Release);
    bus.close().unwrap();
    handle.join().unwrap();
}

#[test]
fn operations_on_a_closed_bus_fail() {
    let bus: Bus<ByteStream> = Bus::new(fast_config());
    assert!(!bus.is_open());
    assert!(matches!(
        bus.send_command_and_await_response(&Packet::empty(PING), WAIT),
        Err(BusError::NotOpen)
    ));
    assert!(matches!(bus.send_packet(&Packet::empty(PING)), Err(BusError::NotOpen)));
    assert!(matches!(bus.recv_event(WAIT), Err(BusError::NotOpen)));
    assert!(matches!(bus.process_byte(), Err(BusError::NotOpen)));
    bus.close().unwrap();
}

#[test]
fn open_twice_is_rejected() {
    let (host_end, _device_end) = ByteStream::pair().unwrap();
    let (other_end, _other_device) = ByteStream::pair().unwrap();
    let bus = Bus::connect(host_end, fast_config()).unwrap();
    assert!(matches!(bus.open(other_end), Err(BusError::AlreadyOpen)));
}

#[test]
fn close_is_prompt_and_idempotent() {
    let (host_end, _device_end) = ByteStream::pair().unwrap();
    let bus = Bus::connect(host_end, BusConfig::default()).unwrap();

    let start = Instant::now();
    bus.close().unwrap();
    assert!(start.elapsed() < Duration::from_millis(1500));
    assert!(!bus.is_open());
    bus.close().unwrap();

    assert!(matches!(
        bus.send_command_and_await_response(&Packet::empty(PING), WAIT),
        Err(BusError::NotOpen)
    ));
}

#[test]
fn reopen_after_close() {
    let (first, _first_device) = ByteStream::pair().unwrap();
    let bus = Bus::connect(first, fast_config()).unwrap();
    bus.close().unwrap();

    let (second, device_end) = ByteStream::pair().unwrap();
    bus.open(second).unwrap();
    let mut device = Device::new(device_end, Dispatcher::with_core()).unwrap();
    let bus = Arc::new(bus);
    let requester = {
        let bus = Arc::clone(&bus);
        thread::spawn(move || bus.send_command_and_await_response(&Packet::empty(PING), WAIT))
    };
    assert!(device.poll_once(WAIT).unwrap());
    assert_eq!(requester.join().unwrap().unwrap().command, PING);
}

#[test]
fn waiter_sees_not_open_when_bus_closes() {
    let (host_end, _device_end) = ByteStream::pair().unwrap();
    let bus = Arc::new(Bus::connect(host_end, fast_config()).unwrap());

    let waiter = {
        let bus = Arc::clone(&bus);
        thread::spawn(move || {
            bus.send_command_and_await_response(&Packet::empty(PING), Duration::from_secs(10))
        })
    };
    thread::sleep(Duration::from_millis(100));
    let start = Instant::now();
    bus.close().unwrap();

    let result = waiter.join().unwrap();
    assert!(matches!(result, Err(BusError::NotOpen)));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn device_disconnect_stops_the_reader() {
    let (host_end, device_end) = ByteStream::pair().unwrap();
    let bus = Bus::connect(host_end, fast_config()).unwrap();
    drop(device_end);

    let err = bus
        .send_command_and_await_response(&Packet::empty(PING), WAIT)
        .unwrap_err();
    assert!(
        matches!(err, BusError::Disconnected | BusError::Transport(_)),
        "unexpected error: {err:?}"
    );
    assert!(bus.is_open());
    bus.close().unwrap();
}
