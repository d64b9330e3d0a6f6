//! Assembly stage implementations.

mod concat;
mod finalize;
mod mux;
mod probe;

pub use concat::ConcatStep;
pub use finalize::FinalizeStep;
pub use mux::MuxStep;
pub use probe::ProbeStep;
