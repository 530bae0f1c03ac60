//! Reassembly of fragmented messages.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::frame::{Frame, FrameKind, Message};
use crate::error::{Error, Result};

/// A message whose final fragment has not arrived yet.
#[derive(Debug)]
struct Partial {
    kind: FrameKind,
    reg: u16,
    count: u16,
    next_seq: u16,
    payload: Vec<u32>,
    started: Instant,
}

/// Collects fragments into messages, keyed by (address, tag).
///
/// Fragments of one message must arrive in order. Any inconsistency discards the partial
/// message and reports `Error::Protocol`; stale partials are dropped by `expire`.
#[derive(Debug)]
pub struct Reassembler {
    partials: HashMap<(u16, u16), Partial>,
    timeout: Duration,
}

impl Reassembler {
    /// Creates a reassembler that forgets partial messages older than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            partials: HashMap::new(),
            timeout,
        }
    }

    /// Number of incomplete messages held.
    pub fn pending(&self) -> usize {
        self.partials.len()
    }

    /// Drops every incomplete message.
    pub fn clear(&mut self) {
        self.partials.clear();
    }

    /// Feeds one frame; returns the message it completes, if any.
    ///
    /// # Arguments
    ///
    /// * `frame` - Decoded frame in arrival order.
    /// * `now` - Arrival time, used to age partial messages.
    ///
    /// # Errors
    ///
    /// `Error::Protocol` on a sequence gap, a kind or header change between fragments, or a
    /// completed payload whose length disagrees with the header's word count.
    pub fn push(&mut self, frame: Frame, now: Instant) -> Result<Option<Message>> {
        let key = (frame.addr, frame.tag);

        if frame.seq == 0 {
            if let Some(stale) = self.partials.remove(&key) {
                tracing::debug!(
                    addr = frame.addr,
                    tag = frame.tag,
                    received = stale.payload.len(),
                    "restarting message, discarding incomplete predecessor"
                );
            }
            if !frame.more {
                return Self::complete(
                    frame.kind,
                    frame.addr,
                    frame.tag,
                    frame.reg,
                    frame.count,
                    frame.payload,
                )
                .map(Some);
            }
            let _ = self.partials.insert(
                key,
                Partial {
                    kind: frame.kind,
                    reg: frame.reg,
                    count: frame.count,
                    next_seq: 1,
                    payload: frame.payload,
                    started: now,
                },
            );
            return Ok(None);
        }

        let Some(mut partial) = self.partials.remove(&key) else {
            return Err(Error::Protocol(format!(
                "fragment {} from {:#06x} (tag {}) has no preceding fragments",
                frame.seq, frame.addr, frame.tag
            )));
        };
        if frame.seq != partial.next_seq {
            return Err(Error::Protocol(format!(
                "fragment sequence gap from {:#06x} (tag {}): expected {}, got {}",
                frame.addr, frame.tag, partial.next_seq, frame.seq
            )));
        }
        if frame.kind != partial.kind || frame.reg != partial.reg || frame.count != partial.count {
            return Err(Error::Protocol(format!(
                "fragment {} from {:#06x} (tag {}) changes the message header",
                frame.seq, frame.addr, frame.tag
            )));
        }
        partial.payload.extend_from_slice(&frame.payload);
        if partial.payload.len() > usize::from(partial.count) {
            return Err(Error::Protocol(format!(
                "message from {:#06x} (tag {}) overruns its {} declared words",
                frame.addr, frame.tag, partial.count
            )));
        }
        if frame.more {
            partial.next_seq = partial.next_seq.wrapping_add(1);
            let _ = self.partials.insert(key, partial);
            return Ok(None);
        }
        Self::complete(
            partial.kind,
            frame.addr,
            frame.tag,
            partial.reg,
            partial.count,
            partial.payload,
        )
        .map(Some)
    }

    /// Drops partial messages older than the timeout; returns how many were dropped.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.partials.len();
        let timeout = self.timeout;
        self.partials
            .retain(|_, p| now.saturating_duration_since(p.started) < timeout);
        let dropped = before - self.partials.len();
        if dropped > 0 {
            tracing::debug!(dropped, "expired incomplete messages");
        }
        dropped
    }

    fn complete(
        kind: FrameKind,
        addr: u16,
        tag: u16,
        reg: u16,
        count: u16,
        payload: Vec<u32>,
    ) -> Result<Message> {
        if kind.carries_payload() && payload.len() != usize::from(count) {
            return Err(Error::Protocol(format!(
                "{kind:?} from {addr:#06x} (tag {tag}) declares {count} words but carries {}",
                payload.len()
            )));
        }
        if !kind.carries_payload() && !payload.is_empty() {
            return Err(Error::Protocol(format!(
                "{kind:?} from {addr:#06x} (tag {tag}) carries an unexpected payload"
            )));
        }
        Ok(Message {
            kind,
            addr,
            tag,
            reg,
            count,
            payload,
        })
    }
}
