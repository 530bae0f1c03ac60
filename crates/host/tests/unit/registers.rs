//! # Register Access Tests
//!
//! Read/write round trips, argument validation, and failure mapping of the register path.

use std::thread;

use dbgnoc_host::Error;
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::harness::{connected, session};
use crate::common::target::{ERROR_STATUS, FakeTarget};

/// Scratch registers on the CTM at address 0, clear of its system registers.
const SCRATCH: u16 = 0x40;

#[rstest]
#[case::single(1)]
#[case::one_fragment(16)]
#[case::two_fragments(17)]
#[case::three_fragments(40)]
fn test_write_then_read_returns_written_values(#[case] count: u16) {
    let (ctx, target) = connected(FakeTarget::standard());
    let words: Vec<u32> = (0..u32::from(count)).map(|i| 0x1000_0000 | i).collect();

    ctx.reg_write(0, SCRATCH, &words).unwrap();
    assert_eq!(ctx.reg_read(0, SCRATCH, count).unwrap(), words);
    assert_eq!(target.lock().unwrap().register(0, SCRATCH + count - 1), words[words.len() - 1]);
}

#[test]
fn test_unknown_address_is_configuration_error() {
    let (ctx, _target) = connected(FakeTarget::standard());
    assert!(matches!(ctx.reg_read(0x99, 0, 1), Err(Error::Configuration(_))));
    assert!(matches!(ctx.reg_write(0x99, 0, &[1]), Err(Error::Configuration(_))));
}

#[test]
fn test_zero_count_and_empty_write_are_invalid() {
    let (ctx, _target) = connected(FakeTarget::standard());
    assert!(matches!(ctx.reg_read(0, SCRATCH, 0), Err(Error::InvalidArgument(_))));
    assert!(matches!(ctx.reg_write(0, SCRATCH, &[]), Err(Error::InvalidArgument(_))));
}

#[test]
fn test_error_frame_is_rejected() {
    let (ctx, target) = connected(FakeTarget::standard());
    target.lock().unwrap().reject(1);

    let err = ctx.reg_read(1, 0x1, 1).unwrap_err();
    assert!(matches!(
        err,
        Error::Rejected {
            addr: 1,
            reg: 0x1,
            code: ERROR_STATUS
        }
    ));
    // The registry is untouched and other modules still answer.
    assert_eq!(ctx.modules().len(), 6);
    assert!(ctx.reg_read(0, SCRATCH, 1).is_ok());
}

#[test]
fn test_silent_module_times_out() {
    let (ctx, target) = connected(FakeTarget::standard());
    target.lock().unwrap().silence(2);
    assert!(matches!(
        ctx.reg_read(2, 0x1, 1),
        Err(Error::Timeout { addr: 2, .. })
    ));
    // The session stays usable after a timeout.
    assert_eq!(ctx.reg_read(1, 0x1, 1).unwrap(), vec![3]);
}

#[test]
fn test_requests_need_a_connection() {
    let (ctx, _target) = session(FakeTarget::standard());
    assert!(matches!(ctx.reg_read(0, 0, 1), Err(Error::Connection(_))));
}

#[test]
fn test_concurrent_requests_are_serialized() {
    let (ctx, _target) = connected(FakeTarget::standard());
    thread::scope(|scope| {
        for worker in 0..4u16 {
            let ctx = &ctx;
            let _handle = scope.spawn(move || {
                let reg = SCRATCH + worker * 0x10;
                for round in 0..25u32 {
                    let words = [(u32::from(worker) << 16) | round, round];
                    ctx.reg_write(0, reg, &words).unwrap();
                    assert_eq!(ctx.reg_read(0, reg, 2).unwrap(), words);
                }
            });
        }
    });
}
