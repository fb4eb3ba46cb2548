//! restora-engine: Workflow controller actor.
//!
//! One task owns the workflow record. Callers talk to it through a clonable
//! [`EngineHandle`]; face service calls run on background tasks so toggles
//! keep flowing while a request is outstanding.

pub mod engine;

pub use engine::{spawn_engine, EngineError, EngineHandle};
