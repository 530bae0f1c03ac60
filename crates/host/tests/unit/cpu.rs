//! # CPU Control Tests
//!
//! Control-register bit patterns, system registers, and full-system reset.

use dbgnoc_host::debug::regs::ctm;
use dbgnoc_host::{ClockStats, Error, ModuleType};
use pretty_assertions::assert_eq;

use crate::common::harness::connected;
use crate::common::target::{FakeTarget, RecordedWrite, SYSTEM_ID};

fn ctrl_write(addr: u16, value: u32) -> RecordedWrite {
    RecordedWrite {
        addr,
        reg: ctm::CPU_CTRL,
        words: vec![value],
    }
}

#[test]
fn test_stall_then_release_issues_two_writes() {
    let (ctx, target) = connected(FakeTarget::standard());
    target.lock().unwrap().clear_writes();

    ctx.cpu_stall(true).unwrap();
    ctx.cpu_stall(false).unwrap();

    assert_eq!(
        target.lock().unwrap().writes(),
        &[ctrl_write(0, ctm::CTRL_STALL), ctrl_write(0, 0)]
    );
}

#[test]
fn test_reset_and_start_bit_patterns() {
    let (ctx, target) = connected(FakeTarget::standard());
    target.lock().unwrap().clear_writes();

    ctx.cpu_reset().unwrap();
    ctx.cpu_start().unwrap();

    assert_eq!(
        target.lock().unwrap().writes(),
        &[
            ctrl_write(0, ctm::CTRL_RESET | ctm::CTRL_STALL),
            ctrl_write(0, ctm::CTRL_START)
        ]
    );
}

#[test]
fn test_control_goes_to_lowest_addressed_ctm() {
    let target = FakeTarget::new()
        .with_mam(0, 64)
        .with_module(ModuleType::Ctm, 1, &[])
        .with_module(ModuleType::Ctm, 1, &[]);
    let (ctx, shared) = connected(target);
    ctx.cpu_start().unwrap();
    assert_eq!(shared.lock().unwrap().writes(), &[ctrl_write(1, ctm::CTRL_START)]);
}

#[test]
fn test_missing_ctm_is_configuration_error() {
    let (ctx, _target) = connected(FakeTarget::new().with_mam(0, 64));
    assert!(matches!(ctx.cpu_stall(true), Err(Error::Configuration(_))));
    assert!(matches!(ctx.system_id(), Err(Error::Configuration(_))));
    assert!(matches!(ctx.read_clkstats(), Err(Error::Configuration(_))));
}

#[test]
fn test_failed_control_write_is_propagated() {
    let (ctx, target) = connected(FakeTarget::standard());
    target.lock().unwrap().reject(0);
    assert!(matches!(ctx.cpu_start(), Err(Error::Rejected { addr: 0, .. })));
}

#[test]
fn test_system_id_and_clock_stats() {
    let (ctx, _target) = connected(FakeTarget::standard());
    assert_eq!(ctx.system_id().unwrap(), SYSTEM_ID);

    let stats = ctx.read_clkstats().unwrap();
    assert_eq!(
        stats,
        ClockStats {
            total: 1000,
            halted: 250
        }
    );
    assert_eq!(stats.running(), 750);
}

#[test]
fn test_system_reset_requires_rediscovery() {
    let (mut ctx, target) = connected(FakeTarget::standard());
    target.lock().unwrap().clear_writes();

    ctx.reset().unwrap();
    assert_eq!(
        target.lock().unwrap().writes(),
        &[RecordedWrite {
            addr: 0,
            reg: ctm::SYS_RESET,
            words: vec![ctm::SYS_RESET_TRIGGER],
        }]
    );
    assert!(ctx.modules().is_empty());
    assert!(matches!(ctx.cpu_start(), Err(Error::Configuration(_))));

    ctx.discover_system().unwrap();
    assert_eq!(ctx.modules().len(), 6);
    ctx.cpu_start().unwrap();
}
