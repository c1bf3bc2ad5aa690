//! rule-units CLI: inspect, verify, and sign-key tooling for serialized stores.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use rule_units::codec::{Envelope, KeyRing, SignedCodec};
use rule_units::config::RuntimeConfig;

#[derive(Parser)]
#[command(name = "rule-units", version, about = "Compiled rule unit store tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what a serialized store contains, without verifying it.
    Inspect {
        /// Serialized store file.
        file: PathBuf,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check a serialized store against the signing configuration.
    Verify {
        /// Serialized store file.
        file: PathBuf,

        /// Runtime configuration (TOML) with a `[signing]` section.
        #[arg(long)]
        config: PathBuf,
    },

    /// Generate an Ed25519 key pair as `<alias>.key` and `<alias>.pub`.
    Keygen {
        /// Alias the key is referenced by in streams and configuration.
        #[arg(long)]
        alias: String,

        /// Directory to write the key files into.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

/// Printable summary of an envelope.
#[derive(Serialize)]
struct Summary {
    signed: bool,
    key_id: Option<String>,
    blobs: Vec<BlobSummary>,
    bindings: Vec<String>,
    definitions: Vec<String>,
}

#[derive(Serialize)]
struct BlobSummary {
    name: String,
    bytes: usize,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { file, json } => {
            let envelope = Envelope::read_from(open(&file)?)?;
            let summary = summarize(&envelope)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&summary).into_diagnostic()?
                );
            } else {
                print_summary(&file, &summary);
            }
        }

        Commands::Verify { file, config } => {
            let config = RuntimeConfig::load(&config)?;
            let codec = SignedCodec::from_config(&config)?;
            let envelope = codec.read_envelope(open(&file)?)?;
            match &envelope.key_id {
                Some(key_id) => println!("{}: signature valid (key \"{key_id}\")", file.display()),
                None => println!("{}: unsigned store accepted", file.display()),
            }
        }

        Commands::Keygen { alias, out } => {
            let ring = KeyRing::generate(&alias);
            let key = ring
                .signing_key()
                .ok_or_else(|| miette::miette!("key generation produced no signing key"))?;
            std::fs::create_dir_all(&out).into_diagnostic()?;
            let secret_path = out.join(format!("{alias}.key"));
            let public_path = out.join(format!("{alias}.pub"));
            std::fs::write(&secret_path, key.to_bytes()).into_diagnostic()?;
            std::fs::write(&public_path, key.verifying_key().to_bytes()).into_diagnostic()?;
            println!("Wrote {} and {}", secret_path.display(), public_path.display());
        }
    }

    Ok(())
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path)
        .into_diagnostic()
        .map_err(|e| e.wrap_err(format!("cannot open {}", path.display())))?;
    Ok(BufReader::new(file))
}

fn summarize(envelope: &Envelope) -> Result<Summary> {
    let mut blobs: Vec<BlobSummary> = envelope
        .blobs()?
        .into_iter()
        .map(|(name, bytes)| BlobSummary {
            name,
            bytes: bytes.len(),
        })
        .collect();
    blobs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Summary {
        signed: envelope.is_signed(),
        key_id: envelope.key_id.clone(),
        blobs,
        bindings: envelope.bindings.iter().map(|(name, _)| name.clone()).collect(),
        definitions: envelope
            .definitions
            .iter()
            .map(|(name, _)| name.clone())
            .collect(),
    })
}

fn print_summary(file: &Path, summary: &Summary) {
    println!("Store {}", file.display());
    match &summary.key_id {
        Some(key_id) => println!("  signed by \"{key_id}\""),
        None => println!("  unsigned"),
    }
    println!("  blobs ({}):", summary.blobs.len());
    for blob in &summary.blobs {
        println!("    {} ({} bytes)", blob.name, blob.bytes);
    }
    println!("  bindings ({}):", summary.bindings.len());
    for name in &summary.bindings {
        println!("    {name}");
    }
    println!("  definitions ({}):", summary.definitions.len());
    for name in &summary.definitions {
        println!("    {name}");
    }
}
