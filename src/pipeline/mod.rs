//! Event pipeline
//!
//! Serializes every transport into one ingress and runs
//! record -> resolve -> animate for each event in arrival order.

mod actor;
mod commands;
mod handle;


pub use actor::{PipelineActor, PipelineOptions};
pub use commands::{Origin, PipelineCommand, PipelineStats};
pub use handle::PipelineHandle;
