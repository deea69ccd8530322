//! Integration tests for aurora-client.
//!
//! These drive a `Session` through the public API the way a transport
//! adapter would, plus the tokio driver against a scripted device.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aurora_client::protocol::ByteWindow;
use aurora_client::{
    commands, AuroraError, Command, DeviceBuilder, Dispatch, PayloadOutcome, Port, Progress,
    Segment, Session, SessionConfig, SessionHooks, State, TransportKind, Upload,
};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

/// Port that records every write.
#[derive(Clone, Default)]
struct MockPort {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

impl MockPort {
    fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.writes.lock().unwrap())
    }
}

impl Port for MockPort {
    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn write(&mut self, bytes: &[u8]) -> aurora_client::Result<()> {
        self.writes.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Bridge
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn session() -> (Session<MockPort>, MockPort) {
    let port = MockPort::default();
    (Session::with_port(port.clone(), SessionConfig::default()), port)
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + Clone + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    (count, move || {
        c.fetch_add(1, Ordering::SeqCst);
    })
}

fn ack(id: u8) -> [u8; 5] {
    [b'c', b'm', b'd', 0, id]
}

fn handshake(s: &mut Session<MockPort>) {
    s.receive(b"a9");
    s.receive(b"f0");
}

fn expire(s: &mut Session<MockPort>) {
    let d = s.deadline().expect("deadline armed");
    assert!(s.on_deadline(d.generation));
}

#[test]
fn test_window_chunk_boundary_independence() {
    let stream: Vec<u8> = b"xxa9..f0cmd\x00\x45zAckERR".to_vec();

    let mut bytewise = ByteWindow::new();
    let mut bytewise_matches = Vec::new();
    for &b in &stream {
        bytewise.push(b);
        bytewise_matches.push(bytewise.matches(b"zAck"));
    }

    for split in [1usize, 2, 3, 7] {
        let mut chunked = ByteWindow::new();
        let mut chunked_matches = Vec::new();
        for chunk in stream.chunks(split) {
            for &b in chunk {
                chunked.push(b);
                chunked_matches.push(chunked.matches(b"zAck"));
            }
        }
        assert_eq!(chunked.as_slice(), bytewise.as_slice());
        assert_eq!(chunked_matches, bytewise_matches);
    }
}

#[test]
fn test_transaction_chunk_boundary_independence() {
    // Device info (handshake, ack, payload), then a queued three-packet upload.
    let mut stream = b"a9f0".to_vec();
    stream.extend_from_slice(&ack(commands::DEVICE_INFO));
    stream.extend_from_slice(&[3, 1, 4, 1, 5, 9, 2]);
    stream.extend_from_slice(b"a9f0");
    stream.extend_from_slice(&ack(commands::GAMMA_UPLOAD));
    stream.extend_from_slice(b"zAckzAckzAck");

    let run = |split: usize| {
        let info = Arc::new(Mutex::new(Vec::new()));
        let sink = info.clone();
        let (done, cb) = counter();
        let (mut s, port) = session();
        s.dispatch(commands::request_device_info(move |bytes| {
            sink.lock().unwrap().push(bytes.to_vec());
        }))
        .unwrap();
        let table: Vec<u8> = (0..12).collect();
        s.dispatch(commands::request_gamma_upload(3, 4, table, cb).unwrap())
            .unwrap();

        for chunk in stream.chunks(split) {
            s.receive(chunk);
        }
        assert!(!s.is_busy(), "split {}", split);
        assert_eq!(s.progress(), Progress::Percent(100), "split {}", split);
        let info = info.lock().unwrap().clone();
        (port.take(), info, done.load(Ordering::SeqCst))
    };

    let whole = run(stream.len());
    let (writes, info, done) = &whole;
    assert_eq!(info, &vec![vec![3, 1, 4, 1, 5, 9, 2]]);
    assert_eq!(*done, 1);
    assert_eq!(writes.len(), 9);
    assert_eq!(writes[3], b"NLED11");
    assert_eq!(writes[5], vec![commands::GAMMA_UPLOAD, 3, 0, 0, 0]);
    assert_eq!(writes[8], vec![8, 9, 10, 11]);

    for split in [1usize, 2, 3, 7] {
        assert_eq!(run(split), whole, "split {}", split);
    }
}

#[test]
fn test_ack_in_any_chunking_fires_once() {
    let ack_bytes = ack(69);
    for split in 1..=5 {
        let (count, cb) = counter();
        let (mut s, _port) = session();
        s.dispatch(Command::new(69, [0; 4]).on_ack(cb)).unwrap();
        handshake(&mut s);

        for chunk in ack_bytes.chunks(split) {
            s.receive(chunk);
        }
        assert_eq!(count.load(Ordering::SeqCst), 1, "split {}", split);
        assert_eq!(s.state(), State::Idle);
    }
}

#[test]
fn test_ack_selects_receive_or_transmit() {
    let (mut s, _port) = session();
    s.dispatch(Command::new(69, [0; 4]).expect_payload(3)).unwrap();
    handshake(&mut s);
    s.receive(ack(69));
    assert_eq!(s.state(), State::RecvPayloadRx);

    let (mut s, _port) = session();
    let upload = Upload::single(Segment::whole(vec![1u8, 2])).unwrap();
    s.dispatch(Command::new(101, [0; 4]).upload(upload)).unwrap();
    handshake(&mut s);
    s.receive(ack(101));
    assert_eq!(s.state(), State::RecvPayloadTxAck);
}

#[test]
fn test_device_info_payload() {
    let received = Arc::new(Mutex::new(None));
    let sink = received.clone();
    let (mut s, _port) = session();
    s.dispatch(commands::request_device_info(move |info| {
        *sink.lock().unwrap() = Some(info.to_vec());
    }))
    .unwrap();
    handshake(&mut s);
    s.receive(ack(commands::DEVICE_INFO));

    s.receive([3u8, 1, 4, 1, 5, 9]);
    assert!(received.lock().unwrap().is_none());
    s.receive([2u8]);
    assert_eq!(received.lock().unwrap().as_deref(), Some(&[3u8, 1, 4, 1, 5, 9, 2][..]));
}

#[test]
fn test_ten_packet_upload_is_sequential() {
    let (done, cb) = counter();
    let (mut s, port) = session();
    let data: Vec<u8> = (0..40).collect();
    let upload = Upload::single(Segment::chunked(data, 4)).unwrap();
    s.dispatch(Command::new(102, [10, 0, 0, 0]).upload(upload).on_packet_ack(cb))
        .unwrap();
    handshake(&mut s);
    port.take();

    s.receive(ack(102));
    assert_eq!(port.take(), vec![vec![0, 1, 2, 3]]);

    for i in 1..10u8 {
        // Nothing goes out until the device acknowledges.
        s.receive(b"zAc");
        assert!(port.take().is_empty());
        s.receive(b"k");
        let base = i * 4;
        assert_eq!(port.take(), vec![vec![base, base + 1, base + 2, base + 3]]);
    }
    assert_eq!(done.load(Ordering::SeqCst), 0);

    s.receive(b"zAck");
    assert_eq!(done.load(Ordering::SeqCst), 1);
    assert_eq!(s.progress(), Progress::Percent(100));
    assert!(port.take().is_empty());

    // Next dispatch starts from a clean packet counter.
    s.dispatch(Command::new(4, [0; 4])).unwrap();
    assert_eq!(s.packets_acked(), 0);
}

#[test]
fn test_merged_upload_switches_buffers() {
    let (mut s, port) = session();
    let cmd = commands::request_full_upload(
        commands::FullUpload {
            index: vec![b'i'; 4].into(),
            index_packets: 2,
            index_packet_size: 2,
            sequences: vec![b's'; 9].into(),
            sequence_packets: 3,
            sequence_packet_size: 3,
            max_sequence: 1,
            idle_sequence: 0,
        },
        || {},
    )
    .unwrap();
    s.dispatch(cmd).unwrap();
    handshake(&mut s);
    port.take();

    s.receive(ack(commands::FULL_UPLOAD));
    for _ in 0..4 {
        s.receive(b"zAck");
    }
    let sent = port.take();
    assert_eq!(sent[0], b"ii");
    assert_eq!(sent[1], b"ii");
    assert_eq!(sent[2], b"sss");
    assert_eq!(sent[4], b"sss");
    assert_eq!(s.progress(), Progress::Percent(80));
}

#[test]
fn test_merged_upload_index_only() {
    let (done, cb) = counter();
    let (mut s, port) = session();
    let cmd = commands::request_full_upload(
        commands::FullUpload {
            index: vec![b'i'; 4].into(),
            index_packets: 2,
            index_packet_size: 2,
            sequences: Vec::<u8>::new().into(),
            sequence_packets: 0,
            sequence_packet_size: 0,
            max_sequence: 0,
            idle_sequence: 0,
        },
        cb,
    )
    .unwrap();
    s.dispatch(cmd).unwrap();
    handshake(&mut s);
    port.take();

    s.receive(ack(commands::FULL_UPLOAD));
    s.receive(b"zAck");
    s.receive(b"zAck");

    assert_eq!(port.take(), vec![b"ii".to_vec(), b"ii".to_vec()]);
    assert_eq!(done.load(Ordering::SeqCst), 1);
    assert!(!s.is_busy());
}

#[test]
fn test_bootloader_closes_port_and_drops_queue() {
    let (fired, hook) = counter();
    let port = MockPort::default();
    let mut s = Session::with_port(port.clone(), SessionConfig::default())
        .with_hooks(SessionHooks::new().on_no_transport(hook));
    s.dispatch(commands::bootloader()).unwrap();
    s.dispatch(commands::intensity(9)).unwrap();
    handshake(&mut s);
    port.take();

    s.receive(ack(commands::BOOTLOADER));
    assert!(!port.is_open());
    assert!(s.queued().is_empty());
    assert!(port.take().is_empty());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn test_queue_coalesces_by_id() {
    let (mut s, port) = session();
    s.dispatch(Command::new(4, [0; 4])).unwrap();

    assert_eq!(
        s.dispatch(Command::new(15, [1, 0, 0, 0])).unwrap(),
        Dispatch::Queued { position: 0 }
    );
    assert_eq!(
        s.dispatch(Command::new(15, [2, 0, 0, 0])).unwrap(),
        Dispatch::Coalesced { position: 0 }
    );
    assert_eq!(s.queued(), vec![15]);

    handshake(&mut s);
    s.receive(ack(4));
    port.take();

    // Command A done, queued B starts with the second payload.
    handshake(&mut s);
    assert_eq!(port.take().last().unwrap(), &vec![15, 2, 0, 0, 0]);
    assert!(s.queued().is_empty());
}

#[test]
fn test_queue_full() {
    let config = SessionConfig {
        queue_capacity: 1,
        ..Default::default()
    };
    let mut s = Session::with_port(MockPort::default(), config);
    s.dispatch(Command::new(4, [0; 4])).unwrap();
    s.dispatch(Command::new(5, [0; 4])).unwrap();

    assert!(matches!(
        s.dispatch(Command::new(6, [0; 4])),
        Err(AuroraError::QueueFull(1))
    ));
}

#[test]
fn test_three_timeouts_fire_hook_once() {
    let (fired, hook) = counter();
    let port = MockPort::default();
    let mut s = Session::with_port(port.clone(), SessionConfig::default())
        .with_hooks(SessionHooks::new().on_timeout(hook));
    assert_eq!(s.timeout(), Duration::from_secs(3));

    s.dispatch(Command::new(69, [0; 4])).unwrap();
    expire(&mut s);
    expire(&mut s);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    expire(&mut s);

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(s.progress(), Progress::Error);
    assert_eq!(s.state(), State::Idle);
    assert!(s.deadline().is_none());
}

#[test]
fn test_abort_mid_upload_stops_packets() {
    let (mut s, port) = session();
    let upload = Upload::single(Segment::chunked(vec![7u8; 100], 10)).unwrap();
    s.dispatch(Command::new(99, [0, 10, 0, 0]).upload(upload)).unwrap();
    handshake(&mut s);
    s.receive(ack(99));
    s.receive(b"zAck");
    s.receive(b"zAck");
    port.take();

    s.abort();
    assert_eq!(s.progress(), Progress::Aborted);
    assert!(!s.is_busy());

    for _ in 0..5 {
        s.receive(b"zAck");
    }
    assert!(port.take().is_empty());
}

#[test]
fn test_abort_during_handshake() {
    let (mut s, port) = session();
    s.dispatch(Command::new(4, [0; 4])).unwrap();
    s.abort();

    assert_eq!(s.progress(), Progress::Aborted);
    port.take();
    s.receive(b"a9");
    assert!(port.take().is_empty());
}

#[test]
fn test_full_download_chain() {
    let data = Arc::new(Mutex::new(Vec::new()));
    let sink = data.clone();
    let (mut s, port) = session();
    s.dispatch(commands::request_full_download(move |bytes| {
        sink.lock().unwrap().extend_from_slice(bytes);
    }))
    .unwrap();

    handshake(&mut s);
    s.receive(ack(commands::FULL_DOWNLOAD_PREP));
    port.take();
    s.receive([0u8, 0, 0, 5]);

    // The data command starts its own handshake.
    assert_eq!(port.take(), vec![b"NLED11".to_vec()]);
    handshake(&mut s);
    s.receive(ack(commands::FULL_DOWNLOAD));
    s.receive(b"hello");

    assert_eq!(&data.lock().unwrap()[..], b"hello");
    assert!(!s.is_busy());
}

#[test]
fn test_payload_callback_can_stop_chain() {
    let (mut s, _port) = session();
    s.dispatch(
        Command::new(120, [0; 4])
            .expect_payload(2)
            .on_payload(|_| PayloadOutcome::Done),
    )
    .unwrap();
    handshake(&mut s);
    s.receive(ack(120));
    s.receive([1u8, 2]);

    assert!(!s.is_busy());
    assert_eq!(s.payload(), &[1, 2]);
}

#[test]
fn test_config_from_json_drives_session() {
    let config = SessionConfig::from_json(r#"{ "timeout_ms": 500, "fast_mode": true }"#).unwrap();
    let port = MockPort::default();
    let mut s = Session::with_port(port.clone(), config);

    assert_eq!(s.timeout(), Duration::from_millis(500));
    s.dispatch(commands::intensity(42)).unwrap();
    assert_eq!(port.take().len(), 1);
}

#[tokio::test]
async fn test_device_request_over_duplex() {
    let (host, mut device) = duplex(4096);
    let (reader, writer) = tokio::io::split(host);

    let serial = Arc::new(Mutex::new(Vec::new()));
    let sink = serial.clone();
    let handle = DeviceBuilder::new(TransportKind::Serial)
        .spawn(reader, writer)
        .unwrap();

    let scripted = tokio::spawn(async move {
        let mut buf = [0u8; 6];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"NLED11");
        device.write_all(b"a").await.unwrap();
        device.write_all(b"9").await.unwrap();

        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"nled99");
        device.write_all(b"f0").await.unwrap();

        let mut frame = [0u8; 5];
        device.read_exact(&mut frame).await.unwrap();
        assert_eq!(frame[0], commands::SERIAL_NUMBER);
        device
            .write_all(&[b'c', b'm', b'd', 0, commands::SERIAL_NUMBER, 0xDE, 0xAD])
            .await
            .unwrap();
        device.write_all(&[0xBE, 0xEF]).await.unwrap();
        device
    });

    let started = handle
        .dispatch(commands::request_serial_number(move |bytes| {
            sink.lock().unwrap().extend_from_slice(bytes);
        }))
        .await
        .unwrap();
    assert_eq!(started, Dispatch::Started);

    let device = scripted.await.unwrap();
    for _ in 0..50 {
        if handle.progress().await.unwrap() == Progress::Percent(100) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(&serial.lock().unwrap()[..], &[0xDE, 0xAD, 0xBE, 0xEF]);

    drop(device);
    handle.wait_for_shutdown().await.unwrap();
}

#[tokio::test]
async fn test_live_frames_over_duplex() {
    let (host, mut device) = duplex(1024);
    let (reader, writer) = tokio::io::split(host);
    let handle = DeviceBuilder::new(TransportKind::Serial)
        .fast_mode(true)
        .spawn(reader, writer)
        .unwrap();

    handle
        .dispatch(commands::live_mode(true, false, 3))
        .await
        .unwrap();
    let mut unlock = [0u8; 17];
    device.read_exact(&mut unlock).await.unwrap();
    assert_eq!(&unlock[12..], &[commands::LIVE_MODE, 1, 0, 0, 3]);
    device.write_all(&ack(commands::LIVE_MODE)).await.unwrap();

    for _ in 0..50 {
        if handle.state().await.unwrap() == State::Idle {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(handle.write_live(vec![10, 20, 30]).await.unwrap());
    let mut frame = [0u8; 3];
    device.read_exact(&mut frame).await.unwrap();
    assert_eq!(frame, [10, 20, 30]);

    assert!(matches!(
        handle.write_live(vec![0u8; 4]).await,
        Err(AuroraError::LiveFrameTooLarge { len: 4, channels: 3 })
    ));
}

#[tokio::test]
async fn test_device_no_transport_hook() {
    let (fired, hook) = counter();
    let (host, device) = duplex(64);
    let (reader, writer) = tokio::io::split(host);
    let handle = DeviceBuilder::new(TransportKind::Tcp)
        .hooks(SessionHooks::new().on_no_transport(hook))
        .spawn(reader, writer)
        .unwrap();

    drop(device);
    handle.wait_for_shutdown().await.unwrap();

    assert!(matches!(
        handle.dispatch(commands::intensity(1)).await,
        Err(AuroraError::NoTransport)
    ));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
