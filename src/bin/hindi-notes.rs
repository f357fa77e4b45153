//! CLI for hindi-notes - study notes from Hindi textbook photos.

use clap::{Args, Parser, Subcommand};
use hindi_notes::model::{DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE};
use hindi_notes::prompt::{EXAMPLE_NOTES, SYSTEM_INSTRUCTION, USER_INSTRUCTION};
use hindi_notes::providers::gemini::{API_KEY_ENV, DEFAULT_MODEL};
use hindi_notes::{
    check_line_pairs, render_outcome, FileUpload, GeminiProvider, GenerationParams, ImageUpload,
    NotesAdapter, NotesModel,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hindi-notes")]
#[command(about = "Turn photos of Hindi textbook pages into bilingual study notes (via Gemini)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate study notes from a page photo (.jpg, .jpeg, .png)
    Generate(GenerateArgs),

    /// Check saved notes for Hindi/English line pairing
    Check(CheckArgs),

    /// Print the instructions sent to the model
    Prompt,

    /// Print example notes
    Example,

    /// Verify the API key and model against the Gemini API
    Health(HealthArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// Photo of the textbook page
    image: PathBuf,

    /// Save the notes to this file (or into this directory as Hindi_Study_Notes.md)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Gemini API key
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Model identifier
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Sampling temperature
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// Upper bound on generated tokens
    #[arg(long, default_value_t = DEFAULT_MAX_OUTPUT_TOKENS)]
    max_output_tokens: u32,

    /// Reject notes whose Hindi lines lack an English line below them
    #[arg(long)]
    strict: bool,

    /// Retry transient failures this many times
    #[arg(long, default_value_t = 0)]
    retries: u32,
}

#[derive(Args)]
struct HealthArgs {
    /// Gemini API key
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Model identifier
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,
}

#[derive(Args)]
struct CheckArgs {
    /// Markdown notes file
    notes: PathBuf,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => {
            generate_notes(args, cli.json).await?;
        }
        Commands::Check(args) => {
            check_notes(args, cli.json)?;
        }
        Commands::Prompt => {
            print_prompt(cli.json)?;
        }
        Commands::Example => {
            println!("{EXAMPLE_NOTES}");
        }
        Commands::Health(args) => {
            check_health(args, cli.json).await?;
        }
    }

    Ok(())
}

async fn generate_notes(args: GenerateArgs, json_output: bool) -> anyhow::Result<()> {
    // Fail on bad input before touching the network
    let upload = FileUpload::new(&args.image)?;
    let Some(api_key) = args.api_key else {
        anyhow::bail!("{API_KEY_ENV} is not set (pass --api-key or export {API_KEY_ENV})");
    };

    let provider = GeminiProvider::builder()
        .api_key(api_key)
        .model(&args.model)
        .build()?;
    let adapter = NotesAdapter::new(provider)
        .with_params(GenerationParams {
            temperature: args.temperature,
            max_output_tokens: args.max_output_tokens,
        })
        .strict(args.strict)
        .with_retries(args.retries);

    if !json_output {
        eprintln!(
            "Analyzing {} with {}...",
            upload.name(),
            adapter.model().model_id()
        );
    }

    let outcome = adapter.generate(&upload).await;
    let notes = match outcome {
        Ok(notes) => notes,
        Err(e) => {
            if json_output {
                let result = serde_json::json!({
                    "success": false,
                    "image": args.image.display().to_string(),
                    "error": e.to_string(),
                    "retryable": e.is_retryable(),
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                eprintln!("{}", render_outcome(&Err(e)));
            }
            std::process::exit(1);
        }
    };

    // Only real notes are offered for saving
    let saved = match args.output {
        Some(ref target) => Some(notes.export().write_to(target)?),
        None => None,
    };

    if json_output {
        let result = serde_json::json!({
            "success": true,
            "image": args.image.display().to_string(),
            "notes": notes,
            "output": saved.as_ref().map(|p| p.display().to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", notes.text);
        eprintln!();
        if notes.truncated {
            eprintln!("Warning: notes were cut off at {} tokens", args.max_output_tokens);
        }
        if let Some(path) = saved {
            eprintln!("Saved notes: {}", path.display());
        }
        eprintln!("Duration: {}ms", notes.duration_ms);
    }

    Ok(())
}

async fn check_health(args: HealthArgs, json_output: bool) -> anyhow::Result<()> {
    let Some(api_key) = args.api_key else {
        anyhow::bail!("{API_KEY_ENV} is not set (pass --api-key or export {API_KEY_ENV})");
    };
    let provider = GeminiProvider::builder()
        .api_key(api_key)
        .model(&args.model)
        .build()?;

    let status = provider.health_check().await;
    if json_output {
        let result = serde_json::json!({
            "provider": provider.name(),
            "model": provider.model_id(),
            "healthy": status.is_ok(),
            "error": status.as_ref().err().map(|e| e.to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        match &status {
            Ok(()) => println!("✓ {} ({}) is reachable", provider.name(), provider.model_id()),
            Err(e) => eprintln!("✗ {} ({}): {e}", provider.name(), provider.model_id()),
        }
    }

    if status.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

fn check_notes(args: CheckArgs, json_output: bool) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.notes)?;
    let report = check_line_pairs(&text);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.is_clean() {
        println!(
            "✓ {}: {} Hindi line(s), all paired",
            args.notes.display(),
            report.hindi_lines
        );
    } else {
        println!("✗ {}: {}", args.notes.display(), report.summary());
    }

    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_prompt(json_output: bool) -> anyhow::Result<()> {
    if json_output {
        let result = serde_json::json!({
            "system": SYSTEM_INSTRUCTION,
            "user": USER_INSTRUCTION,
            "model": DEFAULT_MODEL,
            "temperature": DEFAULT_TEMPERATURE,
            "max_output_tokens": DEFAULT_MAX_OUTPUT_TOKENS,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("SYSTEM:\n{SYSTEM_INSTRUCTION}");
        println!("USER:\n{USER_INSTRUCTION}");
    }
    Ok(())
}
