//! Uploaded page photos and their base64 encoding.

use crate::error::{NotesError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// Image formats accepted by the upload filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// JPEG photo (`.jpg` / `.jpeg`).
    Jpeg,
    /// PNG image (`.png`).
    Png,
}

impl ImageFormat {
    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    /// Detects the format from a file extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    /// Detects the format from the extension of `path`.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// A photo handed to the notes pipeline.
///
/// Reading the bytes is fallible: an upload may be backed by a buffer or file
/// that has gone away by the time the request is made.
pub trait ImageUpload {
    /// Returns the raw image bytes.
    fn read_bytes(&self) -> io::Result<Vec<u8>>;

    /// Declared media type, e.g. `image/jpeg`.
    fn mime_type(&self) -> &str;

    /// Name shown to the user (usually the file name).
    fn name(&self) -> &str;
}

/// An upload already held in memory.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Declared media type.
    pub mime_type: String,
    /// Display name.
    pub name: String,
}

impl UploadedImage {
    /// Creates an in-memory upload.
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            name: name.into(),
        }
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl ImageUpload for UploadedImage {
    fn read_bytes(&self) -> io::Result<Vec<u8>> {
        Ok(self.data.clone())
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// An upload backed by a file on disk. The file is read when encoded.
#[derive(Debug, Clone)]
pub struct FileUpload {
    path: PathBuf,
    format: ImageFormat,
    name: String,
}

impl FileUpload {
    /// Accepts `path` if its extension passes the upload filter (jpg, jpeg, png).
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = ImageFormat::from_path(&path).ok_or_else(|| {
            NotesError::InvalidRequest(format!(
                "unsupported image type: {} (expected .jpg, .jpeg or .png)",
                path.display()
            ))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self { path, format, name })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format chosen by the upload filter.
    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

impl ImageUpload for FileUpload {
    fn read_bytes(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    fn mime_type(&self) -> &str {
        self.format.mime_type()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Base64 text of an upload together with its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    /// Standard base64 encoding of the image bytes.
    pub base64: String,
    /// Media type, passed through as declared.
    pub mime_type: String,
}

impl EncodedPayload {
    /// Encodes raw bytes.
    pub fn from_bytes(data: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            base64: base64::engine::general_purpose::STANDARD.encode(data),
            mime_type: mime_type.into(),
        }
    }

    /// Returns `data:<mime>;base64,<encoded>`.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }

    /// Splits a `data:<mime>;base64,<encoded>` URI back into a payload.
    pub fn from_data_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| NotesError::InvalidRequest("not a data URI".into()))?;
        let (mime_type, base64) = rest.split_once(";base64,").ok_or_else(|| {
            NotesError::InvalidRequest("data URI is not base64-encoded".into())
        })?;

        Ok(Self {
            base64: base64.to_string(),
            mime_type: mime_type.to_string(),
        })
    }

    /// Decodes the payload back to raw bytes.
    pub fn decode(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.base64)
            .map_err(|e| NotesError::InvalidRequest(format!("invalid base64 payload: {e}")))
    }
}

/// Reads an upload and encodes it.
///
/// Fails with [`NotesError::ImageProcessing`] when the bytes cannot be read or
/// are empty; in that case no model request must be made.
pub fn encode_upload<U: ImageUpload + ?Sized>(upload: &U) -> Result<EncodedPayload> {
    let data = upload.read_bytes().map_err(|e| {
        tracing::error!(name = upload.name(), "failed to read uploaded image: {e}");
        NotesError::ImageProcessing(e.to_string())
    })?;

    if data.is_empty() {
        tracing::error!(name = upload.name(), "uploaded image is empty");
        return Err(NotesError::ImageProcessing(format!(
            "{} is empty",
            upload.name()
        )));
    }

    tracing::debug!(
        name = upload.name(),
        mime_type = upload.mime_type(),
        size_bytes = data.len(),
        "encoded uploaded image"
    );
    Ok(EncodedPayload::from_bytes(&data, upload.mime_type()))
}
