//! restora-client: HTTP access to the face service and its asset host.
//!
//! The face service exposes four JSON endpoints (multipart for the upload)
//! and serves face crops, merged images and zip archives under
//! service-relative URLs.

pub mod assets;
pub mod http;

pub use assets::{AssetError, AssetHost, FACES_ARCHIVE_NAME, MERGED_ARCHIVE_NAME};
pub use http::{client, HttpFaceService};
