//! # Trace Collection Tests
//!
//! Event delivery to callbacks, collector lifecycle, monitor configuration, and the
//! guarantee that no callback runs after disconnect returns.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use dbgnoc_host::debug::regs::nrm;
use dbgnoc_host::protocol::{Frame, FrameKind};
use dbgnoc_host::{
    CollectorState, Error, ItmEvent, LogRecord, ModuleType, NrmEvent, Priority, SessionConfig,
    StmEvent,
};
use pretty_assertions::assert_eq;

use crate::common::harness::{connected, session, session_with, test_config, wait_for};
use crate::common::target::{FakeTarget, ROUTER_ID, SYSTEM_ID, TRACED_CORE};

const ITM: u16 = 1;
const STM: u16 = 2;
const NRM: u16 = 3;

const DELIVERY: Duration = Duration::from_secs(2);

fn collect<E: Clone + Send + 'static>() -> (Arc<Mutex<Vec<E>>>, impl Fn(&E) + Send + Sync + 'static) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |event: &E| sink.lock().unwrap().push(event.clone()))
}

#[test]
fn test_itm_event_is_delivered_once_with_exact_fields() {
    let (ctx, target) = connected(FakeTarget::standard());
    let (events, callback) = collect::<ItmEvent>();
    ctx.itm_register_callback(callback).unwrap();

    target
        .lock()
        .unwrap()
        .inject_event(ITM, vec![TRACED_CORE, 1234, 0x8000_0100, 3]);

    assert!(wait_for(DELIVERY, || !events.lock().unwrap().is_empty()));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(
        *events.lock().unwrap(),
        vec![ItmEvent {
            core_id: TRACED_CORE,
            timestamp: 1234,
            pc: 0x8000_0100,
            count: 3,
        }]
    );
}

#[test]
fn test_stm_and_nrm_events_reach_their_callbacks() {
    let (ctx, target) = connected(FakeTarget::standard());
    let (stm_events, on_stm) = collect::<StmEvent>();
    let (nrm_events, on_nrm) = collect::<NrmEvent>();
    ctx.stm_register_callback(on_stm).unwrap();
    ctx.nrm_register_callback(on_nrm).unwrap();

    {
        let mut target = target.lock().unwrap();
        target.inject_event(STM, vec![TRACED_CORE, 10, 0x0002_0042, 0xfeed]);
        target.inject_event(NRM, vec![ROUTER_ID, 11, 5, 0x0403_0201, 0x05]);
    }

    assert!(wait_for(DELIVERY, || {
        stm_events.lock().unwrap().len() == 1 && nrm_events.lock().unwrap().len() == 1
    }));
    assert_eq!(
        stm_events.lock().unwrap()[0],
        StmEvent {
            core_id: TRACED_CORE,
            timestamp: 10,
            id: 0x42,
            value: 0xfeed,
        }
    );
    assert_eq!(
        nrm_events.lock().unwrap()[0],
        NrmEvent {
            router_id: ROUTER_ID,
            timestamp: 11,
            link_flit_counts: vec![1, 2, 3, 4, 5],
        }
    );
}

#[test]
fn test_fragmented_event_is_reassembled() {
    let (ctx, target) = connected(FakeTarget::standard());
    let (events, callback) = collect::<NrmEvent>();
    ctx.nrm_register_callback(callback).unwrap();

    let links: Vec<u8> = (0..80).collect();
    let mut words = vec![ROUTER_ID, 99, 80];
    words.extend(links.chunks(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])));
    target.lock().unwrap().inject_event(NRM, words);

    assert!(wait_for(DELIVERY, || !events.lock().unwrap().is_empty()));
    assert_eq!(events.lock().unwrap()[0].link_flit_counts, links);
}

#[test]
fn test_events_without_callback_are_discarded() {
    let (ctx, target) = connected(FakeTarget::standard());
    let (itm_events, callback) = collect::<ItmEvent>();
    ctx.itm_register_callback(callback).unwrap();

    {
        let mut target = target.lock().unwrap();
        target.inject_event(STM, vec![TRACED_CORE, 1, 2, 3]);
        target.inject_event(NRM, vec![ROUTER_ID, 1, 0]);
        target.inject_event(ITM, vec![TRACED_CORE, 2, 0x100, 1]);
    }

    assert!(wait_for(DELIVERY, || itm_events.lock().unwrap().len() == 1));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(itm_events.lock().unwrap().len(), 1);
    assert_eq!(itm_events.lock().unwrap()[0].timestamp, 2);
}

#[test]
fn test_last_registration_wins() {
    let (ctx, target) = connected(FakeTarget::standard());
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&first);
    ctx.itm_register_callback(move |_| {
        let _ = counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    let counter = Arc::clone(&second);
    ctx.itm_register_callback(move |_| {
        let _ = counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    target
        .lock()
        .unwrap()
        .inject_event(ITM, vec![TRACED_CORE, 1, 0x100, 1]);
    assert!(wait_for(DELIVERY, || second.load(Ordering::SeqCst) == 1));
    assert_eq!(first.load(Ordering::SeqCst), 0);
}

#[test]
fn test_malformed_inbound_packets_are_dropped() {
    let (ctx, target) = connected(FakeTarget::standard());
    let (events, callback) = collect::<ItmEvent>();
    ctx.itm_register_callback(callback).unwrap();

    {
        let mut target = target.lock().unwrap();
        target.inject_raw(vec![0xff, 0, 0]);
        target.inject_event(ITM, vec![TRACED_CORE, 1]);
        target.inject_event(ITM, vec![TRACED_CORE, 7, 0x200, 1]);
    }

    assert!(wait_for(DELIVERY, || events.lock().unwrap().len() == 1));
    assert_eq!(events.lock().unwrap()[0].timestamp, 7);
    assert_eq!(ctx.collector_state(), CollectorState::Running);
}

#[test]
fn test_collector_lifecycle() {
    let (mut ctx, target) = session(FakeTarget::standard());
    assert_eq!(ctx.collector_state(), CollectorState::Idle);

    let (events, callback) = collect::<ItmEvent>();
    ctx.itm_register_callback(callback).unwrap();
    assert_eq!(ctx.collector_state(), CollectorState::Idle);

    ctx.connect().unwrap();
    assert_eq!(ctx.collector_state(), CollectorState::Running);
    target
        .lock()
        .unwrap()
        .inject_event(ITM, vec![TRACED_CORE, 5, 0x100, 1]);
    assert!(wait_for(DELIVERY, || events.lock().unwrap().len() == 1));

    ctx.disconnect().unwrap();
    assert_eq!(ctx.collector_state(), CollectorState::Stopped);

    ctx.connect().unwrap();
    assert_eq!(ctx.collector_state(), CollectorState::Running);
}

#[test]
fn test_no_collector_without_callbacks() {
    let (ctx, _target) = connected(FakeTarget::standard());
    assert_eq!(ctx.collector_state(), CollectorState::Idle);
}

#[test]
fn test_requests_work_while_collector_runs() {
    let (ctx, target) = connected(FakeTarget::standard());
    let (events, callback) = collect::<ItmEvent>();
    ctx.itm_register_callback(callback).unwrap();

    for round in 0..20u32 {
        target
            .lock()
            .unwrap()
            .inject_event(ITM, vec![TRACED_CORE, round, 0x100, 1]);
        ctx.reg_write(0, 0x40, &[round]).unwrap();
        assert_eq!(ctx.reg_read(0, 0x40, 1).unwrap(), vec![round]);
    }
    ctx.mem_write(0, 0, &[9; 70]).unwrap();
    assert_eq!(ctx.mem_read(0, 0, 70).unwrap(), vec![9; 70]);

    assert!(wait_for(DELIVERY, || events.lock().unwrap().len() == 20));
    let stamps: Vec<u32> = events.lock().unwrap().iter().map(|e| e.timestamp).collect();
    assert_eq!(stamps, (0..20).collect::<Vec<_>>());
}

#[test]
fn test_collector_failure_is_reported_once() {
    let (ctx, target) = connected(FakeTarget::standard());
    ctx.itm_register_callback(|_| {}).unwrap();
    target.lock().unwrap().break_link();

    assert!(wait_for(DELIVERY, || ctx.collector_state() == CollectorState::Stopped));
    let err = ctx.system_id().unwrap_err();
    assert!(matches!(err, Error::CollectorFailed(ref source) if matches!(**source, Error::Io(_))));
    assert!(!matches!(ctx.system_id(), Err(Error::CollectorFailed(_))));
}

/// Callback that records the thread it ran on.
fn record_threads() -> (
    Arc<Mutex<Vec<thread::ThreadId>>>,
    impl Fn(&ItmEvent) + Send + Sync + 'static,
) {
    let threads = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&threads);
    (threads, move |_: &ItmEvent| {
        sink.lock().unwrap().push(thread::current().id());
    })
}

#[test]
fn test_events_after_collector_failure_are_not_delivered() {
    let (ctx, target) = connected(FakeTarget::standard());
    let (threads, callback) = record_threads();
    ctx.itm_register_callback(callback).unwrap();
    target.lock().unwrap().glitch_next_receive();

    assert!(wait_for(DELIVERY, || ctx.collector_state() == CollectorState::Stopped));
    target
        .lock()
        .unwrap()
        .inject_event(ITM, vec![TRACED_CORE, 1, 0x100, 1]);

    assert!(matches!(ctx.system_id(), Err(Error::CollectorFailed(_))));
    // This request drains the event; with no collector it is dropped.
    assert_eq!(ctx.system_id().unwrap(), SYSTEM_ID);
    assert!(threads.lock().unwrap().is_empty());
}

#[test]
fn test_events_drained_by_discovery_are_not_delivered() {
    let (mut ctx, target) = session(FakeTarget::standard());
    let (threads, callback) = record_threads();
    ctx.itm_register_callback(callback).unwrap();
    target
        .lock()
        .unwrap()
        .inject_event(ITM, vec![TRACED_CORE, 1, 0x100, 1]);

    ctx.connect().unwrap();
    assert_eq!(ctx.collector_state(), CollectorState::Running);
    target
        .lock()
        .unwrap()
        .inject_event(ITM, vec![TRACED_CORE, 2, 0x100, 1]);
    assert!(wait_for(DELIVERY, || !threads.lock().unwrap().is_empty()));

    let threads = threads.lock().unwrap();
    assert_eq!(threads.len(), 1);
    assert_ne!(threads[0], thread::current().id());
}

#[test]
fn test_restart_after_callback_panic_is_logged() {
    let (mut ctx, target) = connected(FakeTarget::standard());
    let warnings = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&warnings);
    ctx.set_log_sink(move |record: &LogRecord<'_>| {
        if record.priority == Priority::Warning {
            sink.lock().unwrap().push(record.message.to_string());
        }
    });
    ctx.set_log_priority(Priority::Warning as i32);

    ctx.itm_register_callback(|_| panic!("callback failure")).unwrap();
    target
        .lock()
        .unwrap()
        .inject_event(ITM, vec![TRACED_CORE, 1, 0x100, 1]);
    assert!(wait_for(DELIVERY, || ctx.collector_state() == CollectorState::Stopped));

    let (events, callback) = collect::<ItmEvent>();
    ctx.itm_register_callback(callback).unwrap();
    assert_eq!(ctx.collector_state(), CollectorState::Running);
    assert!(
        warnings
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.contains("collector thread panicked"))
    );

    target
        .lock()
        .unwrap()
        .inject_event(ITM, vec![TRACED_CORE, 2, 0x100, 1]);
    assert!(wait_for(DELIVERY, || events.lock().unwrap().len() == 1));
    assert!(matches!(ctx.system_id(), Err(Error::CollectorFailed(_))));
    ctx.disconnect().unwrap();
}

fn itm_fragment(tag: u16, seq: u16, more: bool, payload: Vec<u32>) -> Vec<u8> {
    Frame {
        kind: FrameKind::Event,
        more,
        addr: ITM,
        tag,
        reg: ModuleType::Itm.code(),
        count: 4,
        seq,
        payload,
    }
    .encode()
    .into_bytes()
}

#[test]
fn test_collector_expires_partials_under_steady_traffic() {
    const LATE_PC: u32 = 0xdead_0000;
    let config = SessionConfig {
        reassembly_timeout_ms: 20,
        ..test_config()
    };
    let (mut ctx, target) = session_with(FakeTarget::standard(), config);
    ctx.connect().unwrap();
    let (events, callback) = collect::<ItmEvent>();
    ctx.itm_register_callback(callback).unwrap();

    target
        .lock()
        .unwrap()
        .inject_raw(itm_fragment(0x7000, 0, true, vec![TRACED_CORE, 9]));
    let deadline = Instant::now() + Duration::from_millis(100);
    let mut stamp = 0;
    while Instant::now() < deadline {
        target
            .lock()
            .unwrap()
            .inject_event(ITM, vec![TRACED_CORE, stamp, 0x100, 1]);
        stamp += 1;
        thread::sleep(Duration::from_micros(100));
    }
    target
        .lock()
        .unwrap()
        .inject_raw(itm_fragment(0x7000, 1, false, vec![LATE_PC, 1]));
    target
        .lock()
        .unwrap()
        .inject_event(ITM, vec![TRACED_CORE, u32::MAX, 0x100, 1]);

    assert!(wait_for(DELIVERY, || {
        events.lock().unwrap().iter().any(|e| e.timestamp == u32::MAX)
    }));
    assert!(events.lock().unwrap().iter().all(|e| e.pc != LATE_PC));
}

#[test]
fn test_no_callback_after_disconnect_returns() {
    for _ in 0..5 {
        let (mut ctx, target) = connected(FakeTarget::standard());
        let disconnected = Arc::new(AtomicBool::new(false));
        let delivered = Arc::new(AtomicUsize::new(0));
        let late = Arc::new(AtomicUsize::new(0));

        let (flag, count, late_count) =
            (Arc::clone(&disconnected), Arc::clone(&delivered), Arc::clone(&late));
        ctx.itm_register_callback(move |_| {
            let _ = count.fetch_add(1, Ordering::SeqCst);
            if flag.load(Ordering::SeqCst) {
                let _ = late_count.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let injector = {
            let target = Arc::clone(&target);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut stamp = 0u32;
                while !stop.load(Ordering::SeqCst) {
                    target
                        .lock()
                        .unwrap()
                        .inject_event(ITM, vec![TRACED_CORE, stamp, 0x100, 1]);
                    stamp = stamp.wrapping_add(1);
                    thread::yield_now();
                }
            })
        };

        assert!(wait_for(DELIVERY, || delivered.load(Ordering::SeqCst) > 10));
        ctx.disconnect().unwrap();
        disconnected.store(true, Ordering::SeqCst);
        let at_disconnect = delivered.load(Ordering::SeqCst);

        thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::SeqCst);
        injector.join().unwrap();

        assert_eq!(late.load(Ordering::SeqCst), 0);
        assert_eq!(delivered.load(Ordering::SeqCst), at_disconnect);
    }
}

#[test]
fn test_nrm_sample_interval_is_written_to_every_nrm() {
    let target = FakeTarget::standard().with_module(dbgnoc_host::ModuleType::Nrm, 1, &[]);
    let (ctx, shared) = connected(target);

    ctx.nrm_set_sample_interval(500).unwrap();
    let target = shared.lock().unwrap();
    assert_eq!(target.register(NRM, nrm::SAMPLE_INTERVAL), 500);
    assert_eq!(target.register(6, nrm::SAMPLE_INTERVAL), 500);
}

#[test]
fn test_nrm_sample_interval_needs_an_nrm() {
    let (ctx, _target) = connected(FakeTarget::new().with_mam(0, 64));
    assert!(matches!(
        ctx.nrm_set_sample_interval(10),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn test_itm_config_reports_core() {
    let (ctx, _target) = connected(FakeTarget::standard());
    let itm = ctx.modules()[usize::from(ITM)];
    assert_eq!(ctx.itm_get_config(&itm).unwrap().core_id, TRACED_CORE);

    let stm = ctx.modules()[usize::from(STM)];
    assert!(matches!(ctx.itm_get_config(&stm), Err(Error::Configuration(_))));
}
