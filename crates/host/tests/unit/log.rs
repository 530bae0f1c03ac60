//! # Logging Tests
//!
//! Priority parsing, threshold filtering, and delivery of structured records to sinks.

use std::sync::{Arc, Mutex};

use dbgnoc_host::log::{LogRecord, Logger, Priority, TracingSink, parse_priority};
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::harness::{init_tracing, session};
use crate::common::target::FakeTarget;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Captured {
    priority: Priority,
    file: String,
    function: String,
    message: String,
}

fn capture() -> (Arc<Mutex<Vec<Captured>>>, impl Fn(&LogRecord<'_>) + Send + Sync + 'static) {
    let records = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&records);
    let callback = move |record: &LogRecord<'_>| {
        sink.lock().unwrap().push(Captured {
            priority: record.priority,
            file: record.file.to_string(),
            function: record.function.to_string(),
            message: record.message.to_string(),
        });
    };
    (records, callback)
}

#[rstest]
#[case("3", Some(3))]
#[case(" 7 ", Some(7))]
#[case("err", Some(3))]
#[case("error", Some(3))]
#[case("WARN", Some(4))]
#[case("warning", Some(4))]
#[case("notice", Some(5))]
#[case("info", Some(6))]
#[case("debug", Some(7))]
#[case("verbose", None)]
fn test_parse_priority(#[case] text: &str, #[case] expected: Option<i32>) {
    assert_eq!(parse_priority(text), expected);
}

#[test]
fn test_priorities_follow_syslog_numbering() {
    assert_eq!(Priority::Error.as_i32(), 3);
    assert_eq!(Priority::Debug.as_i32(), 7);
    assert!(Priority::Error < Priority::Warning);
    assert_eq!(Priority::Warning.to_string(), "warning");
}

#[test]
fn test_threshold_filters_records() {
    let logger = Logger::new(Priority::Warning.as_i32());
    let (records, sink) = capture();
    logger.set_sink(Arc::new(sink));

    logger.log(Priority::Info, file!(), line!(), module_path!(), format_args!("hidden"));
    logger.log(Priority::Warning, file!(), line!(), module_path!(), format_args!("shown {}", 1));

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, "shown 1");
    assert_eq!(records[0].priority, Priority::Warning);
    assert!(logger.enabled(Priority::Error));
    assert!(!logger.enabled(Priority::Debug));
}

#[test]
fn test_tracing_sink_accepts_every_priority() {
    init_tracing();
    let logger = Logger::new(Priority::Debug.as_i32());
    logger.set_sink(Arc::new(TracingSink));
    for priority in [
        Priority::Error,
        Priority::Warning,
        Priority::Notice,
        Priority::Info,
        Priority::Debug,
    ] {
        logger.log(priority, file!(), line!(), module_path!(), format_args!("{priority}"));
    }
}

#[test]
fn test_session_records_carry_source_location() {
    let (mut ctx, _target) = session(FakeTarget::standard());
    let (records, sink) = capture();
    ctx.set_log_sink(sink);
    ctx.set_log_priority(Priority::Debug.as_i32());

    ctx.connect().unwrap();

    let records = records.lock().unwrap();
    let connected = records
        .iter()
        .find(|r| r.message.starts_with("connected"))
        .unwrap();
    assert_eq!(connected.priority, Priority::Info);
    assert!(connected.file.ends_with("session.rs"));
    assert!(connected.function.starts_with("dbgnoc_host"));
    assert!(records.iter().any(|r| r.priority == Priority::Debug));
}

#[test]
fn test_error_threshold_suppresses_progress_records() {
    let (mut ctx, _target) = session(FakeTarget::standard());
    let (records, sink) = capture();
    ctx.set_log_sink(sink);
    ctx.set_log_priority(Priority::Error.as_i32());

    ctx.connect().unwrap();
    assert!(records.lock().unwrap().is_empty());
}
