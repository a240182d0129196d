use std::fmt::{self, Display};

use enum_map::EnumMap;
use generational_arena::Index;

use crate::value::{ChannelHandle, PortKind, PortValue};

use super::select::PendingSelect;

/// Stable handle to a process slot in the kernel's arena.
pub type ProcIndex = Index;

/// Opaque restart point for the externally supplied resumption logic.
/// The core never interprets it beyond carrying it between turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint(pub u32);

impl ResumePoint {
    pub const START: ResumePoint = ResumePoint(0);
}

impl Display for ResumePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a live process is linked. A process occupies exactly one
/// location at any instant; every structural transition goes through
/// kernel methods that move the index and retag the location together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Linked into the ready ring.
    Ready,
    /// Committed waiter of a channel, parked until the partner releases it.
    WaitingOn(ChannelHandle),
    /// Tentative suitor of one or more channels during a suspended select.
    /// The channel set lives in the process's pending select record.
    Queried,
    /// Finished; unlinked from everything, eligible for destroy.
    Terminated,
}

/// The fixed set of typed communication ports of one process.
/// Exactly one slot is populated before a rendezvous and read by the
/// partner after it completes.
pub type Ports = EnumMap<PortKind, Option<PortValue>>;

#[derive(Debug)]
pub struct Process {
    /// Monotonically assigned identity, stable for the kernel's lifetime.
    pub serial: u32,
    pub name: String,
    /// Type tag, diagnostics only.
    pub kind: String,
    pub resume_at: ResumePoint,
    pub location: Location,
    pub ports: Ports,
    /// Select fairness cursor; survives across evaluations.
    pub(crate) poll_cursor: usize,
    pub(crate) pending_select: Option<PendingSelect>,
}

impl Process {
    pub(crate) fn new(serial: u32, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            serial,
            name: name.into(),
            kind: kind.into(),
            resume_at: ResumePoint::START,
            location: Location::Ready,
            ports: EnumMap::default(),
            poll_cursor: 0,
            pending_select: None,
        }
    }

    pub fn port(&self, kind: PortKind) -> Option<&PortValue> {
        self.ports[kind].as_ref()
    }

    /// Populate the port slot matching the value's kind.
    pub fn set_port(&mut self, value: PortValue) {
        let kind = value.kind();
        self.ports[kind] = Some(value);
    }

    pub fn take_port(&mut self, kind: PortKind) -> Option<PortValue> {
        self.ports[kind].take()
    }

    pub fn clear_ports(&mut self) {
        for slot in self.ports.values_mut() {
            *slot = None;
        }
    }

    pub(crate) fn populated_ports(&self) -> Vec<PortValue> {
        self.ports.values().filter_map(|slot| slot.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_slots() {
        let mut p = Process::new(1, "writer", "copy");
        assert!(p.port(PortKind::Int).is_none());

        p.set_port(PortValue::Int(42));
        p.set_port(PortValue::Char('c'));
        assert_eq!(p.port(PortKind::Int), Some(&PortValue::Int(42)));
        assert_eq!(p.populated_ports().len(), 2);

        assert_eq!(p.take_port(PortKind::Int), Some(PortValue::Int(42)));
        assert!(p.port(PortKind::Int).is_none());

        p.clear_ports();
        assert!(p.populated_ports().is_empty());
    }

    #[test]
    fn test_new_process_starts_ready() {
        let p = Process::new(3, "root", "main");
        assert_eq!(p.location, Location::Ready);
        assert_eq!(p.resume_at, ResumePoint::START);
    }
}
