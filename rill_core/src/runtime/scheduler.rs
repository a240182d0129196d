use std::collections::HashMap;
use std::time::Instant;

use generational_arena::Arena;
use tracing::debug;

use crate::error::RillError;
use crate::telemetry::RunReport;
use crate::value::{PortKind, PortValue};

use super::channel::Channel;
use super::process::{Location, ProcIndex, Process, ResumePoint};
use super::ready_ring::ReadyRing;

// === Trace output ===

/// Sink for the per-turn diagnostic trace.
pub trait TraceSink {
    fn line(&mut self, line: &str);
}

/// Prints every trace line to stdout.
#[derive(Debug, Default)]
pub struct StdoutTrace;

impl TraceSink for StdoutTrace {
    fn line(&mut self, line: &str) {
        println!("{}", line);
    }
}

/// Drops every trace line.
#[derive(Debug, Default)]
pub struct NullTrace;

impl TraceSink for NullTrace {
    fn line(&mut self, _line: &str) {}
}

// === Run configuration ===

/// Optional step budget for one run. `None` runs until the ready ring
/// drains; `Some(n)` force-stops the loop after exactly n resumptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunConfig {
    pub max_turns: Option<u64>,
}

// === Kernel ===

/// The scheduler context: owns every process record, the ready ring,
/// the channel table and the run statistics. Strictly single-threaded;
/// exactly one process's resumption logic executes at a time.
pub struct Kernel {
    pub(crate) procs: Arena<Process>,
    pub(crate) ready: ReadyRing,
    pub(crate) channels: HashMap<u64, Channel>,
    next_serial: u32,
    pub(crate) next_channel_id: u64,
    trace: Box<dyn TraceSink>,
    last_trace: Option<String>,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    pub fn new() -> Self {
        Self::with_trace(Box::new(NullTrace))
    }

    pub fn with_trace(trace: Box<dyn TraceSink>) -> Self {
        Self {
            procs: Arena::new(),
            ready: ReadyRing::new(),
            channels: HashMap::new(),
            next_serial: 1,
            next_channel_id: 1,
            trace,
            last_trace: None,
        }
    }

    // === Process lifecycle ===

    /// Create a process with a fresh identity and auto-enqueue it ready.
    pub fn spawn(&mut self, name: impl Into<String>, kind: impl Into<String>) -> ProcIndex {
        let serial = self.next_serial;
        self.next_serial += 1;
        let process = Process::new(serial, name, kind);
        debug!(serial, name = %process.name, "spawned process");
        let pid = self.procs.insert(process);
        self.ready.enqueue(pid);
        pid
    }

    pub fn proc(&self, pid: ProcIndex) -> Result<&Process, RillError> {
        self.procs
            .get(pid)
            .ok_or_else(|| RillError::invariant("dangling process handle"))
    }

    pub fn proc_mut(&mut self, pid: ProcIndex) -> Result<&mut Process, RillError> {
        self.procs
            .get_mut(pid)
            .ok_or_else(|| RillError::invariant("dangling process handle"))
    }

    /// The running process removes itself from the ring and ends.
    pub fn terminate(&mut self, pid: ProcIndex) -> Result<(), RillError> {
        self.unlink_running(pid, Location::Terminated)?;
        let p = self.proc(pid)?;
        debug!(serial = p.serial, name = %p.name, "terminated process");
        Ok(())
    }

    /// Release a process record. The process must already be terminated:
    /// destroying one that is still linked anywhere is structural corruption.
    pub fn destroy(&mut self, pid: ProcIndex) -> Result<(), RillError> {
        match self.procs.get(pid) {
            Some(p) if p.location == Location::Terminated => {
                self.procs.remove(pid);
                Ok(())
            }
            Some(p) => Err(RillError::invariant(format!(
                "destroy of live process '{}'",
                p.name
            ))),
            None => Err(RillError::invariant("dangling process handle")),
        }
    }

    // === Ports & markers ===

    pub fn set_port(&mut self, pid: ProcIndex, value: PortValue) -> Result<(), RillError> {
        self.proc_mut(pid)?.set_port(value);
        Ok(())
    }

    pub fn port(&self, pid: ProcIndex, kind: PortKind) -> Result<Option<&PortValue>, RillError> {
        Ok(self.proc(pid)?.port(kind))
    }

    pub fn resume_at(&self, pid: ProcIndex) -> Result<ResumePoint, RillError> {
        Ok(self.proc(pid)?.resume_at)
    }

    pub fn set_resume(&mut self, pid: ProcIndex, at: ResumePoint) -> Result<(), RillError> {
        self.proc_mut(pid)?.resume_at = at;
        Ok(())
    }

    // === Membership transitions ===

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Live processes: everything not yet terminated. Once the ready
    /// ring drains, every one of these is parked on a channel.
    pub fn live_count(&self) -> usize {
        self.procs
            .iter()
            .filter(|(_, p)| p.location != Location::Terminated)
            .count()
    }

    /// Move the running process (the ring head) out of Ready into `to`.
    pub(crate) fn unlink_running(
        &mut self,
        pid: ProcIndex,
        to: Location,
    ) -> Result<(), RillError> {
        self.ready.unlink_head(pid)?;
        self.proc_mut(pid)?.location = to;
        Ok(())
    }

    /// Re-link a parked process into the ready ring.
    pub(crate) fn make_ready(&mut self, pid: ProcIndex) -> Result<(), RillError> {
        {
            let p = self.proc_mut(pid)?;
            match p.location {
                Location::Ready => {
                    return Err(RillError::invariant(format!(
                        "process '{}' woken while already ready",
                        p.name
                    )))
                }
                Location::Terminated => {
                    return Err(RillError::invariant(format!(
                        "terminated process '{}' woken",
                        p.name
                    )))
                }
                Location::WaitingOn(_) | Location::Queried => p.location = Location::Ready,
            }
        }
        self.ready.enqueue(pid);
        Ok(())
    }

    /// Copy the populated port values across a completing rendezvous,
    /// in both directions. Exactly one side carries a value in a
    /// well-formed exchange; copying both ways keeps the primitive
    /// direction-agnostic.
    pub(crate) fn exchange_ports(
        &mut self,
        a: ProcIndex,
        b: ProcIndex,
    ) -> Result<(), RillError> {
        let from_a = self.proc(a)?.populated_ports();
        let from_b = self.proc(b)?.populated_ports();
        {
            let pb = self.proc_mut(b)?;
            for value in from_a {
                pb.set_port(value);
            }
        }
        {
            let pa = self.proc_mut(a)?;
            for value in from_b {
                pa.set_port(value);
            }
        }
        Ok(())
    }

    // === The drive loop ===

    /// Drive the ready ring until it drains or the step budget runs out.
    ///
    /// Per turn: accumulate the ring length into the load statistics,
    /// rotate the ring, peek the new head, emit its trace line, and hand
    /// the process to the external one-step resumption logic. The logic
    /// decides to stay ready (do nothing), block (channel or select
    /// primitives unlink it), or terminate.
    ///
    /// An empty ring before any process has run is an immediate
    /// deadlock and fails with `EmptyQueue`; an empty ring later is
    /// clean exhaustion. Any error from the resumption logic aborts the
    /// whole run, decorated with the executing process and the last
    /// trace line.
    pub fn run<F>(&mut self, config: RunConfig, mut resume: F) -> Result<RunReport, RillError>
    where
        F: FnMut(&mut Kernel, ProcIndex) -> Result<(), RillError>,
    {
        let started = Instant::now();
        let mut turns: u64 = 0;
        let mut len_sum: u64 = 0;
        let mut len_max: usize = 0;

        loop {
            if let Some(limit) = config.max_turns {
                if turns >= limit {
                    break;
                }
            }
            if self.ready.is_empty() {
                if turns == 0 {
                    return Err(self.fatal(RillError::empty_queue(), None));
                }
                break;
            }

            let len = self.ready.len();
            len_sum += len as u64;
            if len > len_max {
                len_max = len;
            }

            self.ready.rotate();
            let pid = match self.ready.peek_head() {
                Ok(pid) => pid,
                Err(err) => return Err(self.fatal(err, None)),
            };
            turns += 1;

            let line = {
                let p = self.proc(pid)?;
                format!(
                    "{:<16} {:<10} {:>4}  step {}",
                    p.name, p.kind, p.resume_at, turns
                )
            };
            self.trace.line(&line);
            self.last_trace = Some(line);

            if let Err(err) = resume(&mut *self, pid) {
                return Err(self.fatal(err, Some(pid)));
            }
        }

        let report = RunReport {
            waiting: self.live_count(),
            turns,
            avg_ready: if turns > 0 {
                len_sum as f64 / turns as f64
            } else {
                0.0
            },
            max_ready: len_max,
            elapsed: started.elapsed(),
        };
        debug!(turns, waiting = report.waiting, "run finished");
        Ok(report)
    }

    fn fatal(&self, err: RillError, pid: Option<ProcIndex>) -> RillError {
        let mut message = err.message.clone();
        if let Some(pid) = pid {
            if let Some(p) = self.procs.get(pid) {
                message = format!("{} (in process '{}' #{})", message, p.name, p.serial);
            }
        }
        if let Some(line) = &self.last_trace {
            message = format!("{} [last trace: {}]", message, line.trim_end());
        }
        RillError {
            message,
            error_type: err.error_type,
        }
    }
}
