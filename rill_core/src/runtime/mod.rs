pub mod channel;
pub mod process;
pub mod ready_ring;
pub mod scheduler;
pub mod select;

pub use channel::{Channel, Rendezvous, SelectorTag};
pub use process::{Location, Ports, ProcIndex, Process, ResumePoint};
pub use ready_ring::ReadyRing;
pub use scheduler::{Kernel, NullTrace, RunConfig, StdoutTrace, TraceSink};
pub use select::{SelectBranch, Selection};
