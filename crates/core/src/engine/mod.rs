//! The Mapping Validator (§4.3) and Replication Loop (§4.8): the two
//! pieces that turn a validated configuration into ongoing replication.

pub mod pipeline;
pub mod repl_loop;
pub mod signals;
pub mod validate;

pub use pipeline::{PipelineCtx, PipelineOutcome};
pub use repl_loop::{run, run_cycle, Connections, LoopDeps, StopReason};
pub use signals::Signals;
pub use validate::{validate, ValidationOutcome};
