#![warn(missing_docs)]
//! hindi-notes - bilingual study notes from photos of Hindi textbook pages.
//!
//! A page photo is base64-encoded, sent to a hosted multimodal model together
//! with a fixed instruction prompt, and the model's markdown comes back as
//! [`StudyNotes`]: every Hindi line followed by its English translation, with
//! emoji headers, bullets and bold keywords.
//!
//! # Quick Start
//!
//! ```no_run
//! use hindi_notes::{FileUpload, GeminiProvider, NotesAdapter};
//!
//! #[tokio::main]
//! async fn main() -> hindi_notes::Result<()> {
//!     let provider = GeminiProvider::builder()
//!         .api_key(std::env::var("GOOGLE_API_KEY").unwrap_or_default())
//!         .build()?;
//!     let adapter = NotesAdapter::new(provider);
//!
//!     let upload = FileUpload::new("lesson-3.jpg")?;
//!     let notes = adapter.generate(&upload).await?;
//!     println!("{}", notes.text);
//!     notes.export().write_to(".")?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `gemini`: Gemini (Google) provider
//! - `cli`: Command-line interface

mod error;
pub mod format;
pub mod model;
pub mod notes;
pub mod prompt;
pub mod providers;
pub mod upload;

// Re-export error types at crate root
pub use error::{NotesError, Result, WARNING_MARKER};

pub use format::{check_line_pairs, FormatReport};
pub use model::{GenerationParams, ModelReply, NotesModel, NotesRequest};
pub use notes::{render_outcome, NotesAdapter, NotesExport, StudyNotes};
pub use upload::{encode_upload, EncodedPayload, FileUpload, ImageFormat, ImageUpload, UploadedImage};

#[cfg(feature = "gemini")]
pub use providers::{GeminiProvider, GeminiProviderBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{NotesError, Result};
    pub use crate::model::NotesModel;
    pub use crate::notes::{NotesAdapter, StudyNotes};
    pub use crate::upload::{FileUpload, ImageUpload, UploadedImage};

    #[cfg(feature = "gemini")]
    pub use crate::providers::GeminiProvider;
}
