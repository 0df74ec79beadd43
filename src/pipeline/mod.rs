//! Job orchestration: fetch, separate, encode, publish.

mod orchestrator;

pub use orchestrator::JobRunner;
