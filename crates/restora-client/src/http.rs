//! Face service over HTTP.

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use restora_core::{
    Artifact, DetectedFace, Detection, FaceService, MergedResult, Metrics, RestoredFace,
    ServiceError, SourceImage,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const DETECT_ENDPOINT: &str = "detect_faces";
const RESTORE_ENDPOINT: &str = "restore_faces";
const PACKAGE_ENDPOINT: &str = "download_zip";
const MERGE_ENDPOINT: &str = "merge_faces";

/// Multipart field carrying the uploaded image.
const IMAGE_FIELD: &str = "image";

/// Creates an HTTP client with the given timeouts.
pub fn client(request_timeout: Duration, connect_timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(APP_USER_AGENT)
        .timeout(request_timeout)
        .connect_timeout(connect_timeout)
        .build()
}

/// Body of the restore and package requests.
#[derive(Serialize)]
struct FacePaths<'a, T> {
    face_paths: &'a [T],
}

#[derive(Serialize)]
struct MergeRequest<'a> {
    original_image_path: &'a str,
}

#[derive(Deserialize, Debug)]
struct DetectResponse {
    faces: Vec<DetectedFace>,
    /// Older service builds omit the path; merging is then unavailable.
    #[serde(default)]
    original_image_path: String,
}

#[derive(Deserialize, Debug)]
struct RestoreResponse {
    restored_faces: Vec<RestoredFace>,
}

#[derive(Deserialize, Debug)]
struct PackageResponse {
    zip_url: String,
}

#[derive(Deserialize, Debug)]
struct MergeResponse {
    merged_image_url: String,
    metrics: Option<Metrics>,
    zip_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl From<DetectResponse> for Detection {
    fn from(r: DetectResponse) -> Self {
        Detection {
            faces: r.faces,
            source_path: r.original_image_path,
        }
    }
}

impl From<MergeResponse> for MergedResult {
    fn from(r: MergeResponse) -> Self {
        MergedResult {
            url: r.merged_image_url,
            metrics: r.metrics.unwrap_or_default(),
            artifact_url: r.zip_url,
        }
    }
}

/// [`FaceService`] backed by the restoration HTTP API.
#[derive(Clone, Debug)]
pub struct HttpFaceService {
    client: Client,
    base: Url,
}

impl HttpFaceService {
    pub fn new(client: Client, base: Url) -> Self {
        Self {
            client,
            base: with_trailing_slash(base),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, name: &str) -> Result<Url, ServiceError> {
        self.base
            .join(name)
            .map_err(|e| ServiceError::Transport(format!("bad endpoint {name}: {e}")))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport)?;
        decode(status, &body)
    }
}

impl FaceService for HttpFaceService {
    async fn detect(&self, image: &SourceImage) -> Result<Detection, ServiceError> {
        let url = self.endpoint(DETECT_ENDPOINT)?;
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.upload_name())
            .mime_str(image.mime_type())
            .map_err(transport)?;
        let form = Form::new().part(IMAGE_FIELD, part);
        tracing::debug!(%url, bytes = image.bytes.len(), "uploading image for detection");

        let response: DetectResponse = self.send(self.client.post(url).multipart(form)).await?;
        Ok(response.into())
    }

    async fn restore(&self, faces: &[DetectedFace]) -> Result<Vec<RestoredFace>, ServiceError> {
        let url = self.endpoint(RESTORE_ENDPOINT)?;
        tracing::debug!(%url, faces = faces.len(), "requesting restoration");
        let response: RestoreResponse = self
            .send(self.client.post(url).json(&FacePaths { face_paths: faces }))
            .await?;
        Ok(response.restored_faces)
    }

    async fn package(&self, faces: &[RestoredFace]) -> Result<Artifact, ServiceError> {
        let url = self.endpoint(PACKAGE_ENDPOINT)?;
        tracing::debug!(%url, faces = faces.len(), "requesting archive");
        let response: PackageResponse = self
            .send(self.client.post(url).json(&FacePaths { face_paths: faces }))
            .await?;
        Ok(Artifact {
            url: response.zip_url,
        })
    }

    async fn merge(&self, source_path: &str) -> Result<MergedResult, ServiceError> {
        let url = self.endpoint(MERGE_ENDPOINT)?;
        tracing::debug!(%url, source_path, "requesting merge");
        let response: MergeResponse = self
            .send(self.client.post(url).json(&MergeRequest {
                original_image_path: source_path,
            }))
            .await?;
        Ok(response.into())
    }
}

fn transport(e: reqwest::Error) -> ServiceError {
    ServiceError::Transport(e.to_string())
}

/// Map a response to either its decoded body or a service error.
///
/// Non-2xx statuses carry the service's `{"error": ...}` message when present.
fn decode<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, ServiceError> {
    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorBody>(body)
            .map(|b| b.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());
        return Err(ServiceError::Status {
            status: status.as_u16(),
            message,
        });
    }
    serde_json::from_slice(body).map_err(|e| ServiceError::Malformed(e.to_string()))
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
