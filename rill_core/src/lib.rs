pub mod error;
pub mod runtime;
pub mod telemetry;
pub mod value;

pub use error::{RillError, RillErrorType};
pub use runtime::{
    Kernel, Location, NullTrace, ProcIndex, Process, ReadyRing, Rendezvous, ResumePoint,
    RunConfig, SelectBranch, Selection, SelectorTag, StdoutTrace, TraceSink,
};
pub use telemetry::RunReport;
pub use value::{ChannelHandle, PortKind, PortValue};
