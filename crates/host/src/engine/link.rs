//! Register access over the shared debug link.
//!
//! `Link` is the single owner of a session's backend. It provides:
//! 1. **Serialized requests:** One request in flight per session, correlated by a wrapping tag.
//! 2. **Inbound routing:** Every received packet is decoded, reassembled, and routed either to
//!    the waiting request or, on the collector thread only, to the trace dispatcher.
//! 3. **Two wait modes:** While the trace collector runs, it is the only reader and requests
//!    wait on a condition variable; otherwise the requesting thread drains the backend itself.
//!
//! All backend access happens under one mutex, so a response can never be consumed as a
//! trace event or the other way round.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::backend::{Backend, Packet};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::log::{Logger, log_dbg, log_warn};
use crate::protocol::{Frame, FrameKind, Message, Reassembler};
use crate::trace::{Dispatcher, TraceEvent};

/// Longest single condvar wait while the collector owns the inbound path.
const COLLECTOR_WAIT_SLICE: Duration = Duration::from_millis(10);

/// What the receive path does with completed trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Events {
    /// Hand them to the registered callbacks. Only the collector thread dispatches.
    Dispatch,
    /// Log and drop them.
    Discard,
}

/// Locks a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Inbound state shared between the collector and requesting threads.
#[derive(Debug)]
struct Inbound {
    reassembler: Reassembler,
    /// Tag of the request currently waiting for its response.
    awaiting: Option<u16>,
    response: Option<Message>,
}

/// The session's debug link: backend, reassembly, and request correlation.
pub(crate) struct Link {
    backend: Mutex<Box<dyn Backend>>,
    inbound: Mutex<Inbound>,
    arrived: Condvar,
    serial: Mutex<()>,
    next_tag: AtomicU16,
    collector_active: AtomicBool,
    dispatcher: Dispatcher,
    logger: Arc<Logger>,
    request_timeout: Duration,
    poll_interval: Duration,
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("collector_active", &self.collector_active.load(Ordering::Relaxed))
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl Link {
    /// Wraps a backend; nothing is sent until the session connects it.
    pub(crate) fn new(backend: Box<dyn Backend>, logger: Arc<Logger>, config: &SessionConfig) -> Self {
        Self {
            backend: Mutex::new(backend),
            inbound: Mutex::new(Inbound {
                reassembler: Reassembler::new(config.reassembly_timeout()),
                awaiting: None,
                response: None,
            }),
            arrived: Condvar::new(),
            serial: Mutex::new(()),
            next_tag: AtomicU16::new(0),
            collector_active: AtomicBool::new(false),
            dispatcher: Dispatcher::default(),
            logger,
            request_timeout: config.request_timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    pub(crate) fn logger(&self) -> &Logger {
        &self.logger
    }

    pub(crate) const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub(crate) const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Runs `f` with exclusive access to the backend.
    pub(crate) fn with_backend<R>(&self, f: impl FnOnce(&mut dyn Backend) -> R) -> R {
        let mut backend = lock(&self.backend);
        f(backend.as_mut())
    }

    /// Drops reassembly state and any late response left from a previous connection.
    pub(crate) fn reset_inbound(&self) {
        let mut inbound = lock(&self.inbound);
        inbound.reassembler.clear();
        inbound.awaiting = None;
        inbound.response = None;
    }

    /// Marks whether the collector thread currently owns the inbound path.
    pub(crate) fn set_collector_active(&self, active: bool) {
        self.collector_active.store(active, Ordering::Release);
        // Wake waiting requests so they re-check who should drain the backend.
        let _guard = lock(&self.inbound);
        self.arrived.notify_all();
    }

    /// Reads `count` consecutive registers from `reg` on module `addr`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` for `count == 0`, otherwise any error of `transact`.
    pub(crate) fn read(&self, addr: u16, reg: u16, count: u16) -> Result<Vec<u32>> {
        self.read_with_timeout(addr, reg, count, self.request_timeout)
    }

    /// Like `read`, with an explicit response timeout.
    pub(crate) fn read_with_timeout(
        &self,
        addr: u16,
        reg: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u32>> {
        if count == 0 {
            return Err(Error::InvalidArgument(
                "register read of zero words".into(),
            ));
        }
        let response =
            self.transact(|tag| Ok(Message::read_request(addr, tag, reg, count)), timeout)?;
        Ok(response.payload)
    }

    /// Reads one register word.
    ///
    /// # Errors
    ///
    /// Any error of `transact`.
    pub(crate) fn read_word(&self, addr: u16, reg: u16) -> Result<u32> {
        self.read(addr, reg, 1)?
            .first()
            .copied()
            .ok_or_else(|| Error::Protocol(format!("empty response from {addr:#06x}")))
    }

    /// Writes `words` to consecutive registers from `reg` on module `addr`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` for an empty or oversized `words`, otherwise any error of
    /// `transact`.
    pub(crate) fn write(&self, addr: u16, reg: u16, words: &[u32]) -> Result<()> {
        let _ack = self.transact(
            |tag| Message::write_request(addr, tag, reg, words),
            self.request_timeout,
        )?;
        Ok(())
    }

    /// Sends one request and waits for its validated response.
    ///
    /// # Errors
    ///
    /// `Error::Timeout` when no response arrives in time, `Error::Rejected` for an error
    /// frame, `Error::Protocol` for a mismatched response, `Error::Io`/`Error::Connection`
    /// from the backend.
    fn transact(
        &self,
        build: impl FnOnce(u16) -> Result<Message>,
        timeout: Duration,
    ) -> Result<Message> {
        let _serial = lock(&self.serial);
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        let request = build(tag)?;
        {
            let mut inbound = lock(&self.inbound);
            inbound.awaiting = Some(tag);
            inbound.response = None;
        }
        log_dbg!(self.logger, "request {request:?}");

        let result = self
            .send_and_wait(&request, timeout)
            .and_then(|response| Self::check_response(&request, response));

        let mut inbound = lock(&self.inbound);
        inbound.awaiting = None;
        inbound.response = None;
        result
    }

    fn send_and_wait(&self, request: &Message, timeout: Duration) -> Result<Message> {
        for frame in request.to_frames() {
            lock(&self.backend).send(&frame.encode())?;
        }
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(response) = lock(&self.inbound).response.take() {
                return Ok(response);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout {
                    addr: request.addr,
                    reg: request.reg,
                    timeout,
                });
            }
            let remaining = deadline - now;
            if self.collector_active.load(Ordering::Acquire) {
                let inbound = lock(&self.inbound);
                if inbound.response.is_none() {
                    let _woken = self
                        .arrived
                        .wait_timeout(inbound, remaining.min(COLLECTOR_WAIT_SLICE))
                        .unwrap_or_else(PoisonError::into_inner);
                }
            } else if !self.pump(Events::Discard)? {
                thread::sleep(self.poll_interval.min(remaining));
            }
        }
    }

    fn check_response(request: &Message, response: Message) -> Result<Message> {
        if response.addr != request.addr {
            return Err(Error::Protocol(format!(
                "response tagged {} came from {:#06x}, request went to {:#06x}",
                response.tag, response.addr, request.addr
            )));
        }
        match (request.kind, response.kind) {
            (_, FrameKind::Error) => Err(Error::Rejected {
                addr: request.addr,
                reg: request.reg,
                code: response.status().unwrap_or_default(),
            }),
            (FrameKind::ReadRequest, FrameKind::ReadResponse)
            | (FrameKind::WriteRequest, FrameKind::WriteAck)
                if response.count == request.count && response.reg == request.reg =>
            {
                Ok(response)
            }
            _ => Err(Error::Protocol(format!(
                "unexpected {response:?} in answer to {request:?}"
            ))),
        }
    }

    /// Expires stale partial messages, then receives and routes at most one inbound packet.
    ///
    /// Returns `Ok(false)` when the backend had nothing pending.
    ///
    /// # Arguments
    ///
    /// * `events` - Whether completed trace events reach the callbacks or are dropped.
    ///
    /// # Errors
    ///
    /// Backend receive failures. Malformed packets are logged and dropped, not returned.
    pub(crate) fn pump(&self, events: Events) -> Result<bool> {
        self.expire_partials();
        let packet = lock(&self.backend).try_receive()?;
        match packet {
            Some(packet) => {
                self.route(&packet, events);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Discards incomplete messages that exceeded the reassembly timeout.
    fn expire_partials(&self) {
        let _dropped = lock(&self.inbound).reassembler.expire(Instant::now());
    }

    fn route(&self, packet: &Packet, events: Events) {
        let frame = match Frame::decode(packet.as_bytes()) {
            Ok(frame) if frame.kind.is_inbound() => frame,
            Ok(frame) => {
                log_warn!(self.logger, "dropping host-bound {:?} frame", frame.kind);
                return;
            }
            Err(e) => {
                log_warn!(self.logger, "dropping inbound packet: {e}");
                return;
            }
        };

        let mut inbound = lock(&self.inbound);
        let message = match inbound.reassembler.push(frame, Instant::now()) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                drop(inbound);
                log_warn!(self.logger, "dropping inbound fragment: {e}");
                return;
            }
        };

        if message.kind == FrameKind::Event {
            drop(inbound);
            match events {
                Events::Dispatch => self.deliver(&message),
                Events::Discard => log_dbg!(
                    self.logger,
                    "trace collector not running, event from {:#06x} discarded",
                    message.addr
                ),
            }
        } else if inbound.awaiting == Some(message.tag) && inbound.response.is_none() {
            inbound.response = Some(message);
            drop(inbound);
            self.arrived.notify_all();
        } else {
            drop(inbound);
            log_dbg!(self.logger, "discarding stale response {message:?}");
        }
    }

    fn deliver(&self, message: &Message) {
        match TraceEvent::decode(message) {
            Ok(Some(event)) => {
                if !self.dispatcher.dispatch(&event) {
                    log_dbg!(
                        self.logger,
                        "no {} callback registered, event discarded",
                        event.module_type().name()
                    );
                }
            }
            Ok(None) => log_dbg!(
                self.logger,
                "ignoring event from {:#06x} with type code {:#06x}",
                message.addr,
                message.reg
            ),
            Err(e) => log_warn!(self.logger, "dropping malformed event: {e}"),
        }
    }
}
