use tracing::debug;

use crate::error::RillError;
use crate::value::ChannelHandle;

use super::channel::SelectorTag;
use super::process::{Location, ProcIndex, ResumePoint};
use super::scheduler::Kernel;

/// One guarded alternative of a select: a channel operation bound to
/// the restart point the process continues at if this branch wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectBranch {
    pub chan: ChannelHandle,
    pub tag: SelectorTag,
    pub resume_at: ResumePoint,
}

/// Branch set of a suspended select, kept on the process so a later
/// commit can resolve the winner and revoke the losing queries.
#[derive(Debug, Clone)]
pub(crate) struct PendingSelect {
    pub branches: Vec<SelectBranch>,
}

/// Outcome of one select evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The branch at this index won; its rendezvous is complete and the
    /// process's marker already points at the branch's restart point.
    Chosen(usize),
    /// No branch was satisfiable. The process is parked as a query
    /// suitor on every idle branch channel and resumes at the winning
    /// branch's restart point when a matching commit arrives.
    Suspended,
}

impl Kernel {
    /// Fair guarded choice over `branches`, evaluated for the running
    /// process.
    ///
    /// Branches are tested in rotation starting at the process's
    /// persisted cursor; the first non-idle branch whose selector tag
    /// matches wins. On a win the rendezvous completes here (ports
    /// exchanged, partner released), and the cursor moves one past the
    /// winner so permanently-enabled branches are chosen round-robin,
    /// never starved.
    ///
    /// With no satisfiable branch the process parks: it registers as
    /// the query suitor of every idle branch channel and unlinks from
    /// the ready ring. The commit that later fires one branch resolves
    /// the whole select and revokes the other queries, so a stale query
    /// can never wake the process a second time.
    pub fn select(
        &mut self,
        pid: ProcIndex,
        branches: &[SelectBranch],
    ) -> Result<Selection, RillError> {
        if branches.is_empty() {
            return Err(RillError::invariant("select over zero branches"));
        }
        let n = branches.len();
        let cursor = self.proc(pid)?.poll_cursor % n;

        for offset in 0..n {
            let i = (cursor + offset) % n;
            let branch = branches[i];
            if self.is_idle(branch.chan)? || !self.matches(branch.chan, branch.tag)? {
                continue;
            }

            let partner = self
                .channel(branch.chan)?
                .waiting
                .ok_or_else(|| RillError::invariant("matched branch lost its waiter"))?;
            self.exchange_ports(pid, partner)?;
            self.release(branch.chan)?;
            {
                let p = self.proc_mut(pid)?;
                p.poll_cursor = (i + 1) % n;
                p.resume_at = branch.resume_at;
            }
            debug!(branch = i, channel = branch.chan.id, "select chose branch");
            return Ok(Selection::Chosen(i));
        }

        // Nothing satisfiable: park as suitor on every idle branch.
        for branch in branches {
            if self.is_idle(branch.chan)? {
                self.register_query(branch.chan, pid)?;
            }
        }
        self.unlink_running(pid, Location::Queried)?;
        self.proc_mut(pid)?.pending_select = Some(PendingSelect {
            branches: branches.to_vec(),
        });
        debug!(branches = n, "select suspended");
        Ok(Selection::Suspended)
    }

    /// True iff `pid`'s suspended select has a branch pairing `chan`
    /// with `tag`. A commit consults this before waking a query suitor,
    /// so a select listing one channel under several tags resumes at
    /// the branch whose tag the commit actually carried.
    pub(crate) fn pending_select_lists(
        &self,
        pid: ProcIndex,
        chan: ChannelHandle,
        tag: SelectorTag,
    ) -> Result<bool, RillError> {
        let pending = self
            .proc(pid)?
            .pending_select
            .as_ref()
            .ok_or_else(|| RillError::invariant("query suitor has no pending select"))?;
        Ok(pending
            .branches
            .iter()
            .any(|b| b.chan == chan && b.tag == tag))
    }

    /// Resolve a suspended select after a commit carrying `tag` fired
    /// `chan`: point the suitor at the winning branch, advance its
    /// fairness cursor, and revoke its queries on every losing branch.
    pub(crate) fn resolve_pending_select(
        &mut self,
        pid: ProcIndex,
        chan: ChannelHandle,
        tag: SelectorTag,
    ) -> Result<(), RillError> {
        let pending = self
            .proc_mut(pid)?
            .pending_select
            .take()
            .ok_or_else(|| RillError::invariant("woken suitor has no pending select"))?;
        let n = pending.branches.len();

        let (winner, branch) = pending
            .branches
            .iter()
            .enumerate()
            .find(|(_, b)| b.chan == chan && b.tag == tag)
            .map(|(i, b)| (i, *b))
            .ok_or_else(|| {
                RillError::invariant("commit fired a branch outside the pending select")
            })?;

        for (i, loser) in pending.branches.iter().enumerate() {
            if i == winner {
                continue;
            }
            let ch = self.channel_mut(loser.chan)?;
            if ch.query == Some(pid) {
                ch.query = None;
            }
        }

        let p = self.proc_mut(pid)?;
        p.resume_at = branch.resume_at;
        p.poll_cursor = (winner + 1) % n;
        debug!(branch = winner, channel = chan.id, "select resolved by commit");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{PortKind, PortValue};

    const TAG: SelectorTag = SelectorTag(1);
    const OTHER_TAG: SelectorTag = SelectorTag(9);

    fn branch(chan: ChannelHandle, at: u32) -> SelectBranch {
        SelectBranch {
            chan,
            tag: TAG,
            resume_at: ResumePoint(at),
        }
    }

    /// Park `who` as the committed waiter of `chan` by rotating it to
    /// the ring head first.
    fn commit_from_tail(kernel: &mut Kernel, chan: ChannelHandle, who: ProcIndex) {
        while kernel.ready.peek_head().unwrap() != who {
            kernel.ready.rotate();
        }
        kernel.commit(chan, who, TAG).unwrap();
    }

    #[test]
    fn test_select_fairness_rotation() {
        // Three permanently-enabled branches: across R evaluations each
        // is chosen R/3 times and the cursor always trails the winner
        // by one.
        let mut kernel = Kernel::new();
        let selector = kernel.spawn("mux", "poll");
        let chans: Vec<_> = (0..3).map(|_| kernel.open_channel()).collect();
        let waiters: Vec<_> = (0..3)
            .map(|i| kernel.spawn(format!("w{}", i), "send"))
            .collect();
        for i in 0..3 {
            commit_from_tail(&mut kernel, chans[i], waiters[i]);
        }

        let branches: Vec<_> = chans.iter().map(|&c| branch(c, 1)).collect();
        let rounds = 30;
        let mut counts = [0u32; 3];

        for _ in 0..rounds {
            let chosen = match kernel.select(selector, &branches).unwrap() {
                Selection::Chosen(i) => i,
                Selection::Suspended => panic!("all branches were enabled"),
            };
            counts[chosen] += 1;
            assert_eq!(kernel.proc(selector).unwrap().poll_cursor, (chosen + 1) % 3);

            // Re-arm the branch that just fired.
            commit_from_tail(&mut kernel, chans[chosen], waiters[chosen]);
        }

        for &count in &counts {
            assert!((count as i64 - rounds as i64 / 3).abs() <= 1);
        }
    }

    #[test]
    fn test_tie_break_prefers_cursor_order() {
        let mut kernel = Kernel::new();
        let selector = kernel.spawn("mux", "poll");
        let a = kernel.open_channel();
        let b = kernel.open_channel();
        let wa = kernel.spawn("wa", "send");
        let wb = kernel.spawn("wb", "send");
        commit_from_tail(&mut kernel, a, wa);
        commit_from_tail(&mut kernel, b, wb);

        // Both enabled; cursor starts at 0 so branch 0 wins, then the
        // cursor makes branch 1 win the next evaluation.
        let branches = [branch(a, 1), branch(b, 2)];
        assert_eq!(
            kernel.select(selector, &branches).unwrap(),
            Selection::Chosen(0)
        );
        commit_from_tail(&mut kernel, a, wa);
        assert_eq!(
            kernel.select(selector, &branches).unwrap(),
            Selection::Chosen(1)
        );
    }

    #[test]
    fn test_mismatched_tag_branch_is_not_ready() {
        let mut kernel = Kernel::new();
        let selector = kernel.spawn("mux", "poll");
        let a = kernel.open_channel();
        let wa = kernel.spawn("wa", "send");
        commit_from_tail(&mut kernel, a, wa);

        // The only branch expects a different tag, so the select must
        // suspend rather than rendezvous with a mismatched waiter. The
        // busy mismatched channel gets no query either.
        while kernel.ready.peek_head().unwrap() != selector {
            kernel.ready.rotate();
        }
        let branches = [SelectBranch {
            chan: a,
            tag: OTHER_TAG,
            resume_at: ResumePoint(1),
        }];
        assert_eq!(
            kernel.select(selector, &branches).unwrap(),
            Selection::Suspended
        );
        assert_eq!(kernel.channel(a).unwrap().query, None);
        assert_eq!(kernel.channel(a).unwrap().waiting, Some(wa));
    }

    #[test]
    fn test_suspend_then_resolve_revokes_losing_queries() {
        // Scenario: select over A and B, both idle. The process parks
        // on both; a commit on B resumes it at B's restart point and
        // the stale query on A must never fire later.
        let mut kernel = Kernel::new();
        let selector = kernel.spawn("mux", "poll");
        let a = kernel.open_channel();
        let b = kernel.open_channel();

        let branches = [branch(a, 1), branch(b, 2)];
        assert_eq!(
            kernel.select(selector, &branches).unwrap(),
            Selection::Suspended
        );
        assert_eq!(kernel.proc(selector).unwrap().location, Location::Queried);
        assert_eq!(kernel.channel(a).unwrap().query, Some(selector));
        assert_eq!(kernel.channel(b).unwrap().query, Some(selector));

        let producer = kernel.spawn("producer", "send");
        kernel.set_port(producer, PortValue::Int(5)).unwrap();
        kernel.commit(b, producer, TAG).unwrap();

        let mux = kernel.proc(selector).unwrap();
        assert_eq!(mux.location, Location::Ready);
        assert_eq!(mux.resume_at, ResumePoint(2));
        assert_eq!(mux.poll_cursor, 0); // (winner 1 + 1) mod 2
        assert_eq!(kernel.channel(a).unwrap().query, None);
        assert_eq!(
            kernel.port(selector, PortKind::Int).unwrap(),
            Some(&PortValue::Int(5))
        );

        // A later commit on A finds no suitor and simply parks.
        let late = kernel.spawn("late", "send");
        commit_from_tail(&mut kernel, a, late);
        assert_eq!(kernel.proc(selector).unwrap().location, Location::Ready);
        assert_eq!(kernel.ready_len(), 1);
    }

    #[test]
    fn test_one_channel_two_tags_resumes_at_committed_tag() {
        // A select may list one channel under two tags with distinct
        // restart points; a commit carrying the second tag must resume
        // the process at the second branch, not the first.
        let mut kernel = Kernel::new();
        let selector = kernel.spawn("mux", "poll");
        let c = kernel.open_channel();

        let branches = [
            SelectBranch {
                chan: c,
                tag: TAG,
                resume_at: ResumePoint(10),
            },
            SelectBranch {
                chan: c,
                tag: OTHER_TAG,
                resume_at: ResumePoint(20),
            },
        ];
        assert_eq!(
            kernel.select(selector, &branches).unwrap(),
            Selection::Suspended
        );

        let producer = kernel.spawn("producer", "send");
        kernel.commit(c, producer, OTHER_TAG).unwrap();

        let mux = kernel.proc(selector).unwrap();
        assert_eq!(mux.location, Location::Ready);
        assert_eq!(mux.resume_at, ResumePoint(20));
        assert_eq!(mux.poll_cursor, 0); // (winner 1 + 1) mod 2
        assert_eq!(kernel.channel(c).unwrap().query, None);
    }

    #[test]
    fn test_commit_with_unlisted_tag_leaves_query_parked() {
        // A commit whose tag no pending branch lists must not wake the
        // suitor or clear its query; only a matching commit does.
        let mut kernel = Kernel::new();
        let selector = kernel.spawn("mux", "poll");
        let c = kernel.open_channel();

        assert_eq!(
            kernel.select(selector, &[branch(c, 4)]).unwrap(),
            Selection::Suspended
        );

        let stranger = kernel.spawn("stranger", "send");
        kernel.commit(c, stranger, OTHER_TAG).unwrap();
        assert_eq!(kernel.proc(selector).unwrap().location, Location::Queried);
        assert_eq!(kernel.channel(c).unwrap().query, Some(selector));
        assert_eq!(
            kernel.proc(stranger).unwrap().location,
            Location::WaitingOn(c)
        );

        // Once the mismatched waiter is released, a commit with the
        // listed tag resolves the select normally.
        kernel.release(c).unwrap();
        commit_from_tail(&mut kernel, c, stranger);
        assert_eq!(kernel.proc(selector).unwrap().location, Location::Ready);
        assert_eq!(kernel.proc(selector).unwrap().resume_at, ResumePoint(4));
        assert_eq!(kernel.channel(c).unwrap().query, None);
    }

    #[test]
    fn test_resumed_branch_completes_with_release() {
        // After a suspended select resolves, the committed partner is
        // still parked on the winning channel; the branch logic reads
        // its ports and releases it.
        let mut kernel = Kernel::new();
        let selector = kernel.spawn("mux", "poll");
        let a = kernel.open_channel();

        assert_eq!(
            kernel.select(selector, &[branch(a, 1)]).unwrap(),
            Selection::Suspended
        );

        let producer = kernel.spawn("producer", "send");
        kernel.commit(a, producer, TAG).unwrap();
        assert!(!kernel.is_idle(a).unwrap());

        kernel.release(a).unwrap();
        assert!(kernel.is_idle(a).unwrap());
        assert_eq!(kernel.proc(producer).unwrap().location, Location::Ready);
    }

    #[test]
    fn test_immediate_choice_keeps_selector_ready() {
        let mut kernel = Kernel::new();
        let selector = kernel.spawn("mux", "poll");
        let a = kernel.open_channel();
        let wa = kernel.spawn("wa", "send");
        commit_from_tail(&mut kernel, a, wa);

        assert_eq!(
            kernel.select(selector, &[branch(a, 3)]).unwrap(),
            Selection::Chosen(0)
        );
        // Immediate winner: the selector never left the ring and the
        // partner is already released.
        assert_eq!(kernel.proc(selector).unwrap().location, Location::Ready);
        assert_eq!(kernel.proc(selector).unwrap().resume_at, ResumePoint(3));
        assert_eq!(kernel.proc(wa).unwrap().location, Location::Ready);
        assert!(kernel.is_idle(a).unwrap());
        assert_eq!(kernel.ready_len(), 2);
    }
}
