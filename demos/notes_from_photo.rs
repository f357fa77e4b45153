//! Study notes from a textbook photo.
//!
//! Run with: `cargo run --example notes_from_photo -- <page.jpg>`
//!
//! Requires `GOOGLE_API_KEY` environment variable.

use hindi_notes::{render_outcome, FileUpload, GeminiProvider, NotesAdapter};

#[tokio::main]
async fn main() -> hindi_notes::Result<()> {
    let input_path = std::env::args()
        .nth(1)
        .expect("Usage: notes_from_photo <page.jpg>");
    let api_key = std::env::var("GOOGLE_API_KEY").unwrap_or_default();

    let provider = GeminiProvider::builder().api_key(api_key).build()?;
    let adapter = NotesAdapter::new(provider);

    let upload = FileUpload::new(input_path)?;
    let outcome = adapter.generate(&upload).await;
    println!("{}", render_outcome(&outcome));

    if let Ok(notes) = outcome {
        let path = notes.export().write_to(".")?;
        println!("Saved notes to {}", path.display());
    }

    Ok(())
}
