use std::collections::HashMap;

use tracing::info;

use rill_core::{
    Kernel, PortKind, PortValue, Rendezvous, ResumePoint, RillError, RunConfig, RunReport,
    SelectBranch, SelectorTag, StdoutTrace,
};

const TAG_INT: SelectorTag = SelectorTag(1);

fn kernel_for(trace: bool) -> Kernel {
    if trace {
        Kernel::with_trace(Box::new(StdoutTrace))
    } else {
        Kernel::new()
    }
}

/// One sender hands one integer to one receiver over a rendezvous
/// channel; whichever party arrives second completes the exchange.
pub fn handoff(config: RunConfig, trace: bool) -> Result<RunReport, RillError> {
    let mut kernel = kernel_for(trace);
    let chan = kernel.open_channel();
    kernel.spawn("sender", "send");
    kernel.spawn("receiver", "recv");

    kernel.run(config, move |k, pid| {
        let (kind, at) = {
            let p = k.proc(pid)?;
            (p.kind.clone(), p.resume_at)
        };
        match (kind.as_str(), at.0) {
            ("send", 0) => {
                k.set_port(pid, PortValue::Int(42))?;
                match k.attempt(chan, pid, TAG_INT)? {
                    Rendezvous::Completed => finish(k, pid)?,
                    Rendezvous::Parked => k.set_resume(pid, ResumePoint(1))?,
                }
            }
            // Parked sender: the receiver released us after reading.
            ("send", 1) => finish(k, pid)?,
            ("recv", 0) => match k.attempt(chan, pid, TAG_INT)? {
                Rendezvous::Completed => {
                    report_received(k, pid)?;
                    finish(k, pid)?;
                }
                Rendezvous::Parked => k.set_resume(pid, ResumePoint(1))?,
            },
            ("recv", 1) => {
                report_received(k, pid)?;
                finish(k, pid)?;
            }
            _ => {
                return Err(RillError::invariant(format!(
                    "unknown restart point {} for kind '{}'",
                    at, kind
                )))
            }
        }
        Ok(())
    })
}

/// Two producers each send three integers down their own channel; a
/// multiplexer drains both with a fair select until six values arrived.
pub fn mux(config: RunConfig, trace: bool) -> Result<RunReport, RillError> {
    let mut kernel = kernel_for(trace);
    let chan_a = kernel.open_channel();
    let chan_b = kernel.open_channel();
    let mux = kernel.spawn("mux", "mux");
    let pa = kernel.spawn("prod-a", "prod");
    let pb = kernel.spawn("prod-b", "prod");

    let mut left: HashMap<u32, i64> = HashMap::new();
    for pid in [pa, pb] {
        left.insert(kernel.proc(pid)?.serial, 3);
    }
    let mut received = 0u32;

    let branches = [
        SelectBranch {
            chan: chan_a,
            tag: TAG_INT,
            resume_at: ResumePoint(1),
        },
        SelectBranch {
            chan: chan_b,
            tag: TAG_INT,
            resume_at: ResumePoint(2),
        },
    ];

    kernel.run(config, move |k, pid| {
        let (kind, at, serial) = {
            let p = k.proc(pid)?;
            (p.kind.clone(), p.resume_at, p.serial)
        };
        match (kind.as_str(), at.0) {
            ("prod", 0) => {
                let chan = if pid == pa { chan_a } else { chan_b };
                let remaining = left
                    .get(&serial)
                    .copied()
                    .ok_or_else(|| RillError::invariant("producer without send budget"))?;
                k.set_port(pid, PortValue::Int(remaining))?;
                match k.attempt(chan, pid, TAG_INT)? {
                    Rendezvous::Completed => producer_sent(k, pid, &mut left, serial)?,
                    Rendezvous::Parked => k.set_resume(pid, ResumePoint(1))?,
                }
            }
            ("prod", 1) => producer_sent(k, pid, &mut left, serial)?,
            ("mux", 0) => {
                // Either an immediate winner (marker now points at the
                // branch) or a suspension resolved later by a commit;
                // both continue at the branch's restart point.
                k.select(pid, &branches)?;
            }
            ("mux", 1) | ("mux", 2) => {
                let chan = if at.0 == 1 { chan_a } else { chan_b };
                // A resolved suspension leaves the committed producer
                // parked on the winning channel; finish its exchange.
                if !k.is_idle(chan)? && k.matches(chan, TAG_INT)? {
                    k.release(chan)?;
                }
                report_received(k, pid)?;
                received += 1;
                if received == 6 {
                    finish(k, pid)?;
                } else {
                    k.set_resume(pid, ResumePoint(0))?;
                }
            }
            _ => {
                return Err(RillError::invariant(format!(
                    "unknown restart point {} for kind '{}'",
                    at, kind
                )))
            }
        }
        Ok(())
    })
}

/// Processes that never block or terminate; only useful with a step
/// budget. Defaults to 24 turns when none is given.
pub fn spin(config: RunConfig, trace: bool) -> Result<RunReport, RillError> {
    let config = RunConfig {
        max_turns: config.max_turns.or(Some(24)),
    };
    let mut kernel = kernel_for(trace);
    for i in 0..3 {
        kernel.spawn(format!("spin-{}", i), "spin");
    }
    kernel.run(config, |_, _| Ok(()))
}

fn producer_sent(
    kernel: &mut Kernel,
    pid: rill_core::ProcIndex,
    left: &mut HashMap<u32, i64>,
    serial: u32,
) -> Result<(), RillError> {
    let remaining = left
        .get_mut(&serial)
        .ok_or_else(|| RillError::invariant("producer without send budget"))?;
    *remaining -= 1;
    if *remaining == 0 {
        finish(kernel, pid)
    } else {
        kernel.set_resume(pid, ResumePoint(0))
    }
}

fn report_received(kernel: &Kernel, pid: rill_core::ProcIndex) -> Result<(), RillError> {
    let p = kernel.proc(pid)?;
    if let Some(value) = p.port(PortKind::Int) {
        info!(process = %p.name, %value, "received");
    }
    Ok(())
}

fn finish(kernel: &mut Kernel, pid: rill_core::ProcIndex) -> Result<(), RillError> {
    kernel.terminate(pid)?;
    kernel.destroy(pid)
}
