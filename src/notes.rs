//! Photo in, study notes out.
//!
//! [`NotesAdapter`] ties the pieces together: it encodes the upload, sends the
//! fixed instructions plus the image to a [`NotesModel`], and returns either
//! the notes or a tagged error. A failed image read stops the pipeline before
//! any model call.

use crate::error::{NotesError, Result};
use crate::format::{enforce_line_pairs, FormatReport};
use crate::model::{GenerationParams, NotesModel, NotesRequest};
use crate::upload::{encode_upload, EncodedPayload, ImageUpload};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// File name offered for downloaded notes.
pub const EXPORT_FILE_NAME: &str = "Hindi_Study_Notes.md";

/// Media type of downloaded notes.
pub const EXPORT_MIME_TYPE: &str = "text/markdown";

/// Notes produced for one page photo.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[must_use = "study notes should be displayed or exported"]
pub struct StudyNotes {
    /// Markdown text exactly as the model returned it.
    pub text: String,
    /// Model that produced the notes.
    pub model: String,
    /// Wall-clock time of the successful model call, in milliseconds.
    pub duration_ms: u64,
    /// True if the model stopped at the output-token bound.
    pub truncated: bool,
    /// Line pairing report, present when the adapter runs in strict mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatReport>,
}

impl StudyNotes {
    /// The downloadable artifact for these notes.
    pub fn export(&self) -> NotesExport {
        NotesExport {
            file_name: EXPORT_FILE_NAME,
            mime_type: EXPORT_MIME_TYPE,
            content: self.text.clone(),
        }
    }
}

/// A file the user can download; content is identical to the displayed notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotesExport {
    /// Suggested file name.
    pub file_name: &'static str,
    /// Media type.
    pub mime_type: &'static str,
    /// File content.
    pub content: String,
}

impl NotesExport {
    /// Writes the artifact. A directory target gets the default file name.
    pub fn write_to(&self, target: impl AsRef<Path>) -> Result<PathBuf> {
        let target = target.as_ref();
        let path = if target.is_dir() {
            target.join(self.file_name)
        } else {
            target.to_path_buf()
        };
        std::fs::write(&path, self.content.as_bytes())?;
        tracing::info!(path = %path.display(), bytes = self.content.len(), "saved study notes");
        Ok(path)
    }
}

/// Renders an outcome as the single text a display shows.
///
/// Failures become one warning line. Check the `Result` before offering a
/// download; an error string is not study notes.
pub fn render_outcome(outcome: &Result<StudyNotes>) -> String {
    match outcome {
        Ok(notes) => notes.text.clone(),
        Err(e) => e.warning_text(),
    }
}

/// Sends page photos to a model and collects the notes.
pub struct NotesAdapter<M> {
    model: M,
    params: GenerationParams,
    strict: bool,
    max_retries: u32,
}

impl<M: NotesModel> NotesAdapter<M> {
    /// Creates an adapter with default parameters, no format check, no retries.
    pub fn new(model: M) -> Self {
        Self {
            model,
            params: GenerationParams::default(),
            strict: false,
            max_retries: 0,
        }
    }

    /// Sets the sampling parameters.
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Rejects notes whose Hindi lines are not each followed by an English line.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Retries transient failures up to `max_retries` times.
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// The underlying model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Encodes `upload` and requests notes for it.
    ///
    /// If the image cannot be read the model is never called.
    pub async fn generate<U: ImageUpload + ?Sized>(&self, upload: &U) -> Result<StudyNotes> {
        let payload = encode_upload(upload)?;
        self.request_notes(&payload).await
    }

    /// Requests notes for an already encoded image.
    pub async fn request_notes(&self, payload: &EncodedPayload) -> Result<StudyNotes> {
        self.params.validate()?;
        let request = NotesRequest::for_payload(payload, self.params);

        let mut attempt = 0;
        loop {
            match self.attempt(&request).await {
                Ok(notes) => return Ok(notes),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = e.retry_after().unwrap_or(Duration::from_secs(1));
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient error: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, request: &NotesRequest) -> Result<StudyNotes> {
        let start = Instant::now();
        tracing::debug!(model = self.model.model_id(), "requesting study notes");

        let reply = self.model.generate(request).await.map_err(|e| {
            tracing::error!(provider = self.model.name(), "model call failed: {e}");
            NotesError::invocation(self.model.name(), e)
        })?;

        let format = if self.strict {
            Some(enforce_line_pairs(&reply.text)?)
        } else {
            None
        };

        Ok(StudyNotes {
            text: reply.text,
            model: reply.model,
            duration_ms: start.elapsed().as_millis() as u64,
            truncated: reply.truncated,
            format,
        })
    }
}
