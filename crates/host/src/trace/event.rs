//! Trace events and their payload decoding.
//!
//! Payload layouts (32-bit words):
//! - ITM: core id, timestamp, program counter, repeat count.
//! - STM: core id, timestamp, event id (low 16 bits), value.
//! - NRM: router id, timestamp, monitored link count, then one flit count byte per link,
//!   packed four per word, least significant byte first.

use crate::debug::ModuleType;
use crate::error::{Error, Result};
use crate::protocol::{FrameKind, Message};

/// Instruction-trace sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItmEvent {
    /// Core that executed the instruction.
    pub core_id: u32,
    /// Cycle timestamp.
    pub timestamp: u32,
    /// Program counter.
    pub pc: u32,
    /// Number of times the instruction repeated.
    pub count: u32,
}

/// Network-link utilization sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NrmEvent {
    /// Router the monitor is attached to.
    pub router_id: u32,
    /// Cycle timestamp.
    pub timestamp: u32,
    /// Flits seen on each monitored link during the sample interval.
    pub link_flit_counts: Vec<u8>,
}

impl NrmEvent {
    /// Number of links the monitor observes.
    pub fn monitored_links(&self) -> usize {
        self.link_flit_counts.len()
    }
}

/// Software trace value emitted by code running on a core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StmEvent {
    /// Core that emitted the value.
    pub core_id: u32,
    /// Cycle timestamp.
    pub timestamp: u32,
    /// Software-defined event id.
    pub id: u16,
    /// Traced value.
    pub value: u32,
}

/// A decoded trace event of any class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// From an Instruction-Trace Monitor.
    Itm(ItmEvent),
    /// From a Network Rate Monitor.
    Nrm(NrmEvent),
    /// From a Software Trace Monitor.
    Stm(StmEvent),
}

const ITM_WORDS: usize = 4;
const STM_WORDS: usize = 4;
const NRM_HEADER_WORDS: usize = 3;

impl TraceEvent {
    /// Decodes an event message.
    ///
    /// Returns `Ok(None)` for module classes that do not stream events.
    ///
    /// # Errors
    ///
    /// `Error::Protocol` if the message is not an event or its payload is truncated.
    pub fn decode(message: &Message) -> Result<Option<Self>> {
        if message.kind != FrameKind::Event {
            return Err(Error::Protocol(format!(
                "expected an event, got {:?}",
                message.kind
            )));
        }
        let words = message.payload.as_slice();
        let event = match ModuleType::from_code(message.reg) {
            ModuleType::Itm => {
                let w = expect_words(message, ITM_WORDS)?;
                Self::Itm(ItmEvent {
                    core_id: w[0],
                    timestamp: w[1],
                    pc: w[2],
                    count: w[3],
                })
            }
            ModuleType::Stm => {
                let w = expect_words(message, STM_WORDS)?;
                Self::Stm(StmEvent {
                    core_id: w[0],
                    timestamp: w[1],
                    id: (w[2] & 0xffff) as u16,
                    value: w[3],
                })
            }
            ModuleType::Nrm => {
                let w = expect_words(message, NRM_HEADER_WORDS)?;
                let links = w[2] as usize;
                let needed = NRM_HEADER_WORDS + links.div_ceil(4);
                if words.len() < needed {
                    return Err(Error::Protocol(format!(
                        "NRM event from {:#06x} reports {links} links but carries {} words",
                        message.addr,
                        words.len()
                    )));
                }
                let link_flit_counts = words[NRM_HEADER_WORDS..needed]
                    .iter()
                    .flat_map(|w| w.to_le_bytes())
                    .take(links)
                    .collect();
                Self::Nrm(NrmEvent {
                    router_id: w[0],
                    timestamp: w[1],
                    link_flit_counts,
                })
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Module class the event came from.
    pub const fn module_type(&self) -> ModuleType {
        match self {
            Self::Itm(_) => ModuleType::Itm,
            Self::Nrm(_) => ModuleType::Nrm,
            Self::Stm(_) => ModuleType::Stm,
        }
    }
}

fn expect_words(message: &Message, needed: usize) -> Result<&[u32]> {
    message.payload.get(..needed).ok_or_else(|| {
        Error::Protocol(format!(
            "{} event from {:#06x} carries {} words, needs {needed}",
            ModuleType::from_code(message.reg).name(),
            message.addr,
            message.payload.len()
        ))
    })
}
