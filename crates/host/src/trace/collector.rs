//! Background receive loop for trace events.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::engine::link::{Events, Link, lock};
use crate::error::{Error, Result};
use crate::log::{log_err, log_info, log_warn};

/// Lifecycle of a session's trace collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectorState {
    /// Never started in this session.
    Idle,
    /// Receive loop is draining the debug link.
    Running,
    /// Stopped by disconnect, or ended by a receive failure.
    Stopped,
}

/// Owns the collector thread and its stop flag.
#[derive(Debug)]
pub(crate) struct Collector {
    started: bool,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    failure: Arc<Mutex<Option<Error>>>,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    pub(crate) fn new() -> Self {
        Self {
            started: false,
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
            failure: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn state(&self) -> CollectorState {
        match &self.handle {
            Some(handle) if !handle.is_finished() => CollectorState::Running,
            _ if self.started => CollectorState::Stopped,
            _ => CollectorState::Idle,
        }
    }

    /// Starts the receive loop unless it is already running.
    ///
    /// # Errors
    ///
    /// `Error::Io` if the thread cannot be spawned.
    pub(crate) fn start(&mut self, link: &Arc<Link>) -> Result<()> {
        if self.state() == CollectorState::Running {
            return Ok(());
        }
        // Reap a loop that ended on its own before starting another.
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log_warn!(link.logger(), "previous trace collector thread panicked");
            }
        }
        self.stop.store(false, Ordering::Release);
        link.set_collector_active(true);

        let worker_link = Arc::clone(link);
        let stop = Arc::clone(&self.stop);
        let failure = Arc::clone(&self.failure);
        let spawned = thread::Builder::new()
            .name("dbgnoc-trace".into())
            .spawn(move || receive_loop(&worker_link, &stop, &failure));
        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.started = true;
                Ok(())
            }
            Err(e) => {
                link.set_collector_active(false);
                Err(e.into())
            }
        }
    }

    /// Signals the loop to exit and joins it. After this returns no callback is running
    /// and none will be invoked by the collector.
    pub(crate) fn stop(&mut self, link: &Link) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log_err!(link.logger(), "trace collector thread panicked");
            }
        }
        link.set_collector_active(false);
    }

    /// Takes the failure that ended the loop, if any; reported once.
    pub(crate) fn take_failure(&self) -> Option<Error> {
        lock(&self.failure).take()
    }
}

/// Clears the link's collector flag however the loop exits, including by a panicking callback.
struct ActiveGuard<'a> {
    link: &'a Link,
    failure: &'a Mutex<Option<Error>>,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            *lock(self.failure) = Some(Error::Io(io::Error::other("trace callback panicked")));
        }
        self.link.set_collector_active(false);
    }
}

fn receive_loop(link: &Link, stop: &AtomicBool, failure: &Mutex<Option<Error>>) {
    let _active = ActiveGuard { link, failure };
    log_info!(link.logger(), "trace collector started");
    while !stop.load(Ordering::Acquire) {
        match link.pump(Events::Dispatch) {
            Ok(true) => {}
            Ok(false) => thread::sleep(link.poll_interval()),
            Err(e) => {
                log_err!(link.logger(), "trace collector stopped: {e}");
                *lock(failure) = Some(e);
                return;
            }
        }
    }
    log_info!(link.logger(), "trace collector stopped");
}
