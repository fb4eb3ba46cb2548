//! restora-core: Face restoration workflow model.
//!
//! Holds the workflow record (detect → select → restore → rank → merge/download),
//! the best/worst ranking rule, and the capability trait through which the
//! workflow talks to the remote face service. No I/O happens in this crate.

pub mod error;
pub mod ranking;
pub mod service;
pub mod types;
pub mod workflow;

pub use error::WorkflowError;
pub use ranking::{FaceTag, Ranking};
pub use service::{Artifact, Detection, FaceService, ServiceError};
pub use types::{
    DetectedFace, FaceIndex, MergedResult, Metrics, Mode, OpKind, RestoredFace, SourceImage,
};
pub use workflow::{Comparison, Ticket, WorkflowState};
