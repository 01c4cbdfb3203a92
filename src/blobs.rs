use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

const INCIDENT_PREFIX: &str = "incidents";
const FALLBACK_FILE_NAME: &str = "attachment";

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` at `key` and returns a publicly fetchable URL.
    async fn put(&self, key: &str, bytes: &[u8]) -> AppResult<String>;
}

/// Writes objects under a local directory that a web server exposes at `public_url`.
pub struct FsBlobStore {
    root: PathBuf,
    public_url: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> AppResult<String> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(format!("{}/{}", self.public_url, key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Voice,
    Media,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub async fn from_path(kind: AttachmentKind, path: &Path) -> AppResult<Self> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| AppError::validation("attachment", "attachment path has no file name"))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self {
            kind,
            file_name,
            bytes,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadedAttachments {
    pub voice_recording_url: Option<String>,
    pub media_urls: Vec<String>,
}

/// Object key for an incident attachment: `incidents/<uuid>/<file name>`.
pub fn attachment_key(file_name: &str) -> String {
    let file_name = file_name.trim().replace(['/', '\\'], "_");
    let file_name = match file_name.as_str() {
        "" | "." | ".." => FALLBACK_FILE_NAME,
        name => name,
    };
    format!("{INCIDENT_PREFIX}/{}/{}", Uuid::new_v4(), file_name)
}

/// Uploads one attachment at a time, reporting the completed fraction after each.
pub async fn upload_attachments<B, F>(
    blobs: &B,
    attachments: &[Attachment],
    mut progress: F,
) -> AppResult<UploadedAttachments>
where
    B: BlobStore + ?Sized,
    F: FnMut(f32),
{
    let mut uploaded = UploadedAttachments::default();
    let total = attachments.len();

    for (index, attachment) in attachments.iter().enumerate() {
        let key = attachment_key(&attachment.file_name);
        let url = blobs.put(&key, &attachment.bytes).await?;
        info!(key = %key, "attachment uploaded");
        match attachment.kind {
            AttachmentKind::Voice => uploaded.voice_recording_url = Some(url),
            AttachmentKind::Media => uploaded.media_urls.push(url),
        }
        progress((index + 1) as f32 / total as f32);
    }

    Ok(uploaded)
}
