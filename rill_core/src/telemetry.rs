use std::fmt::{self, Display};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Summary of one scheduler run: deadlock accounting plus the load
/// statistics accumulated turn by turn.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunReport {
    /// Processes still alive when the loop ended. Zero means every
    /// process terminated; anything else is parked on a channel (or
    /// still runnable, if a step budget cut the run short).
    pub waiting: usize,
    pub turns: u64,
    pub avg_ready: f64,
    pub max_ready: usize,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn all_finished(&self) -> bool {
        self.waiting == 0
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.waiting == 0 {
            writeln!(f, "All processes finished")?;
        } else {
            writeln!(f, "{} processes waiting", self.waiting)?;
        }
        if self.turns > 0 {
            writeln!(
                f,
                "ready queue length: {:.1} average, {:.1} maximum",
                self.avg_ready, self.max_ready as f64
            )?;
        }
        if self.elapsed < Duration::from_secs(1) {
            write!(f, "run time: {} ms", self.elapsed.as_millis())
        } else {
            write!(f, "run time: {:.1} s", self.elapsed.as_secs_f64())
        }
    }
}
