use std::fmt::{self, Display};

use tracing::debug;

use crate::error::RillError;
use crate::value::ChannelHandle;

use super::process::{Location, ProcIndex};
use super::scheduler::Kernel;

/// Identifies which operation and value shape a pending rendezvous
/// carries. Mismatched tags never rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorTag(pub u32);

impl Display for SelectorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One rendezvous point.
///
/// Holds at most one committed waiter (the unconditional party) and at
/// most one tentative suitor (a select branch that found the channel
/// idle). `query` is cleared exactly when a commit arrives carrying a
/// tag the suitor's pending select lists for this channel; a commit
/// with an unlisted tag leaves the suitor parked. `selector` is the
/// tag of the last commit, `None` before the first.
#[derive(Debug)]
pub struct Channel {
    pub handle: ChannelHandle,
    pub(crate) waiting: Option<ProcIndex>,
    pub(crate) query: Option<ProcIndex>,
    pub(crate) selector: Option<SelectorTag>,
}

impl Channel {
    fn new(handle: ChannelHandle) -> Self {
        Self {
            handle,
            waiting: None,
            query: None,
            selector: None,
        }
    }
}

/// Outcome of an unconditional channel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendezvous {
    /// A matching partner was already waiting; the exchange is done and
    /// the caller stays ready.
    Completed,
    /// The caller committed and parked; it resumes when the partner
    /// releases it.
    Parked,
}

impl Kernel {
    pub fn open_channel(&mut self) -> ChannelHandle {
        let id = self.next_channel_id;
        self.next_channel_id += 1;
        let handle = ChannelHandle { id };
        self.channels.insert(id, Channel::new(handle));
        debug!(channel = id, "opened channel");
        handle
    }

    pub(crate) fn channel(&self, chan: ChannelHandle) -> Result<&Channel, RillError> {
        self.channels
            .get(&chan.id)
            .ok_or_else(|| RillError::invariant(format!("unknown channel {}", chan)))
    }

    pub(crate) fn channel_mut(&mut self, chan: ChannelHandle) -> Result<&mut Channel, RillError> {
        self.channels
            .get_mut(&chan.id)
            .ok_or_else(|| RillError::invariant(format!("unknown channel {}", chan)))
    }

    /// True iff no committed waiter is registered.
    pub fn is_idle(&self, chan: ChannelHandle) -> Result<bool, RillError> {
        Ok(self.channel(chan)?.waiting.is_none())
    }

    /// True iff the selector tag recorded by the last commit equals `tag`.
    /// Always false on a channel no commit has touched yet.
    pub fn matches(&self, chan: ChannelHandle, tag: SelectorTag) -> Result<bool, RillError> {
        Ok(self.channel(chan)?.selector == Some(tag))
    }

    /// Record the running process as the committed waiter of `chan`.
    ///
    /// The caller is unlinked from the ready ring and parked as
    /// `WaitingOn(chan)` in the same transition, so the single-owner
    /// invariant holds by construction. If a query suitor is registered
    /// and its pending select lists this channel under `tag`, its
    /// rendezvous completes here: ports are exchanged, the select
    /// resolves at that branch (revoking the queries everywhere else),
    /// and the suitor moves to Ready. A suitor whose pending branches
    /// do not list `tag` is left parked. The committer itself stays
    /// parked until the partner calls `release`.
    pub fn commit(
        &mut self,
        chan: ChannelHandle,
        pid: ProcIndex,
        tag: SelectorTag,
    ) -> Result<(), RillError> {
        if self.channel(chan)?.waiting.is_some() {
            return Err(RillError::invariant(format!(
                "commit on {} which already has a committed waiter",
                chan
            )));
        }
        self.unlink_running(pid, Location::WaitingOn(chan))?;

        let suitor = {
            let ch = self.channel_mut(chan)?;
            ch.waiting = Some(pid);
            ch.selector = Some(tag);
            ch.query
        };
        let suitor = match suitor {
            Some(s) if self.pending_select_lists(s, chan, tag)? => {
                self.channel_mut(chan)?.query = None;
                Some(s)
            }
            _ => None,
        };
        debug!(channel = chan.id, tag = tag.0, woke_suitor = suitor.is_some(), "commit");

        if let Some(suitor) = suitor {
            self.exchange_ports(pid, suitor)?;
            self.resolve_pending_select(suitor, chan, tag)?;
            self.make_ready(suitor)?;
        }
        Ok(())
    }

    /// Move the committed waiter back to Ready and clear the slot.
    /// Invoked by whichever party completes the exchange from the other
    /// side.
    pub fn release(&mut self, chan: ChannelHandle) -> Result<(), RillError> {
        let waiter = self.channel_mut(chan)?.waiting.take();
        match waiter {
            Some(pid) => {
                debug!(channel = chan.id, "release");
                self.make_ready(pid)
            }
            None => Err(RillError::invariant(format!(
                "release on idle channel {}",
                chan
            ))),
        }
    }

    /// Record a tentative suitor. Wakes nothing; the suitor is resolved
    /// when a matching commit arrives, or revoked when another branch of
    /// its select wins first. Registering the same suitor twice is a
    /// no-op so a select may list one channel under several tags.
    pub fn register_query(&mut self, chan: ChannelHandle, pid: ProcIndex) -> Result<(), RillError> {
        self.proc(pid)?;
        let ch = self.channel_mut(chan)?;
        if ch.waiting.is_some() {
            return Err(RillError::invariant(format!(
                "query registered on busy channel {}",
                chan
            )));
        }
        match ch.query {
            Some(existing) if existing == pid => Ok(()),
            Some(_) => Err(RillError::invariant(format!(
                "channel {} already has a query suitor",
                chan
            ))),
            None => {
                ch.query = Some(pid);
                Ok(())
            }
        }
    }

    /// The composed unconditional operation: complete against a waiting
    /// partner if one matches, otherwise commit and park.
    pub fn attempt(
        &mut self,
        chan: ChannelHandle,
        pid: ProcIndex,
        tag: SelectorTag,
    ) -> Result<Rendezvous, RillError> {
        if !self.is_idle(chan)? {
            if !self.matches(chan, tag)? {
                return Err(RillError::invariant(format!(
                    "selector mismatch on {}: no waiter holding tag {}",
                    chan, tag
                )));
            }
            let partner = self
                .channel(chan)?
                .waiting
                .ok_or_else(|| RillError::invariant("matched channel lost its waiter"))?;
            self.exchange_ports(pid, partner)?;
            self.release(chan)?;
            Ok(Rendezvous::Completed)
        } else {
            self.commit(chan, pid, tag)?;
            Ok(Rendezvous::Parked)
        }
    }
}
