//! Capability interface to the remote face service.
//!
//! The workflow only needs four request/response round trips. Keeping them
//! behind a trait lets the engine run against the HTTP client in production
//! and against an in-memory fake in tests.

use std::future::Future;
use thiserror::Error;

use crate::types::{DetectedFace, MergedResult, RestoredFace, SourceImage};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Detection response.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub faces: Vec<DetectedFace>,
    /// Server-side path of the uploaded original, needed for merging.
    pub source_path: String,
}

/// A packaged download.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub url: String,
}

/// Remote face service: detection, restoration, packaging and merging.
///
/// Futures must be `Send` so the engine can drive them on background tasks.
pub trait FaceService {
    /// Upload the source image and detect faces in it.
    fn detect(
        &self,
        image: &SourceImage,
    ) -> impl Future<Output = Result<Detection, ServiceError>> + Send;

    /// Restore the given face crops and compute per-face metrics.
    fn restore(
        &self,
        faces: &[DetectedFace],
    ) -> impl Future<Output = Result<Vec<RestoredFace>, ServiceError>> + Send;

    /// Package restored faces into a downloadable archive.
    fn package(
        &self,
        faces: &[RestoredFace],
    ) -> impl Future<Output = Result<Artifact, ServiceError>> + Send;

    /// Paste every restored face back into the original image.
    fn merge(
        &self,
        source_path: &str,
    ) -> impl Future<Output = Result<MergedResult, ServiceError>> + Send;
}
