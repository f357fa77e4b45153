//! Model backends.

#[cfg(feature = "gemini")]
pub mod gemini;

#[cfg(feature = "gemini")]
pub use gemini::{GeminiProvider, GeminiProviderBuilder};
