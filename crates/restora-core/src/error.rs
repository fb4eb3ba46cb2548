use thiserror::Error;

use crate::types::{FaceIndex, OpKind};

/// Recoverable workflow errors. None of them tears the workflow down: the
/// state keeps its last good value and the caller surfaces a notice.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("face detection failed: {0}")]
    DetectionFailed(String),
    #[error("restoration failed: {0}")]
    RestorationFailed(String),
    #[error("download failed: {0}")]
    DownloadFailed(String),
    #[error("merging failed: {0}")]
    MergeFailed(String),
    #[error("select at least one face")]
    NoFacesChosen,
    #[error("original image path missing; run face detection first")]
    MissingSourcePath,
    #[error("{0} already in progress")]
    OperationInProgress(OpKind),
    #[error("no image chosen")]
    NoImageChosen,
    #[error("not a usable image: {0}")]
    InvalidImage(String),
    #[error("face {0} is not among the detected faces")]
    UnknownFace(FaceIndex),
    #[error("download position {position} out of range (have {len})")]
    PositionOutOfRange { position: usize, len: usize },
    #[error("restored faces already merged")]
    AlreadyMerged,
    #[error("{0} result discarded: workflow changed while the request was in flight")]
    Superseded(OpKind),
}
