//! CLI binary for edgequake-invoice.
//!
//! `serve` runs the HTTP extraction service; `extract` runs the same
//! pipeline over local files and prints JSON or CSV.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use edgequake_invoice::server::{self, AppState, ServerConfig, DEFAULT_MAX_BODY_BYTES};
use edgequake_invoice::{
    export, extract_paths_with, ExtractionConfig, FieldSet, PdfPolicy,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on port 8080
  invoice-extract serve

  # Extract one invoice to stdout
  invoice-extract extract invoice.png

  # Several files, CSV with one row per line item
  invoice-extract extract --format csv scans/*.pdf > invoices.csv

  # Rasterise PDF page one instead of sending the PDF itself
  invoice-extract extract --pdf-policy rasterize-first-page invoice.pdf

  # Call the service
  curl -X POST localhost:8080/extract -H 'Content-Type: application/json' \
    -d "{\"imageData\":\"$(base64 -w0 invoice.png)\",\"mimeType\":\"image/png\"}"

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default credential)
  EDGEQUAKE_PROVIDER      Use an edgequake-llm provider instead of raw Gemini
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (only for rasterize-first-page)
  RUST_LOG                Log filter, e.g. edgequake_invoice=debug
"#;

/// Extract structured invoice data from images and PDFs using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-extract",
    version,
    about = "Extract structured invoice data from images and PDFs using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "INVOICE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "INVOICE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP extraction service.
    Serve(ServeArgs),
    /// Extract invoices from local files.
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "INVOICE_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Maximum request body size in bytes.
    #[arg(long, env = "INVOICE_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    /// Do not send CORS headers.
    #[arg(long, env = "INVOICE_NO_CORS")]
    no_cors: bool,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Image or PDF files.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value = "json")]
    format: FormatArg,

    /// Write output to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    model: ModelArgs,
}

/// Options shared by both subcommands.
#[derive(Args, Debug)]
struct ModelArgs {
    /// Gemini model ID (or provider model ID with --provider).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// edgequake-llm provider name (openai, anthropic, gemini, ollama, …).
    /// Without it, Gemini is called directly over REST.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Environment variable holding the Gemini API key.
    #[arg(long, env = "INVOICE_API_KEY_ENV", default_value = "GEMINI_API_KEY")]
    api_key_env: String,

    /// Gemini API base URL.
    #[arg(long, env = "INVOICE_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Which fields to request.
    #[arg(long, env = "INVOICE_FIELDS", value_enum, default_value = "extended")]
    fields: FieldsArg,

    /// How PDFs reach the model.
    #[arg(long, env = "INVOICE_PDF_POLICY", value_enum, default_value = "passthrough")]
    pdf_policy: PdfPolicyArg,

    /// Width in pixels when rasterising PDFs.
    #[arg(long, env = "INVOICE_RASTER_WIDTH", default_value_t = 2000,
          value_parser = clap::value_parser!(u32).range(256..=4096))]
    raster_width: u32,

    /// Files processed concurrently in a batch.
    #[arg(short, long, env = "INVOICE_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Maximum files per batch request.
    #[arg(long, env = "INVOICE_MAX_BATCH_FILES", default_value_t = 20)]
    max_batch_files: usize,

    /// Attempts per document before giving up.
    #[arg(long, env = "INVOICE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "INVOICE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "INVOICE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Path to a text file replacing the built-in extraction prompt.
    #[arg(long, env = "INVOICE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Json,
    Csv,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FieldsArg {
    Standard,
    Extended,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PdfPolicyArg {
    Passthrough,
    RasterizeFirstPage,
}

impl From<FieldsArg> for FieldSet {
    fn from(v: FieldsArg) -> Self {
        match v {
            FieldsArg::Standard => FieldSet::Standard,
            FieldsArg::Extended => FieldSet::Extended,
        }
    }
}

impl From<PdfPolicyArg> for PdfPolicy {
    fn from(v: PdfPolicyArg) -> Self {
        match v {
            PdfPolicyArg::Passthrough => PdfPolicy::Passthrough,
            PdfPolicyArg::RasterizeFirstPage => PdfPolicy::RasterizeFirstPage,
        }
    }
}

impl ModelArgs {
    fn to_config(&self) -> Result<ExtractionConfig> {
        let mut builder = ExtractionConfig::builder()
            .api_key_env(&self.api_key_env)
            .field_set(self.fields.into())
            .pdf_policy(self.pdf_policy.into())
            .raster_width(self.raster_width)
            .concurrency(self.concurrency)
            .max_batch_files(self.max_batch_files)
            .max_attempts(self.max_attempts)
            .api_timeout_secs(self.api_timeout)
            .temperature(self.temperature);

        if let Some(ref model) = self.model {
            builder = builder.model(model);
        }
        if let Some(ref provider) = self.provider {
            builder = builder.provider_name(provider);
        }
        if let Some(ref url) = self.api_base_url {
            builder = builder.api_base_url(url);
        }
        if let Some(ref path) = self.system_prompt {
            let prompt = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
            builder = builder.system_prompt(prompt);
        }

        Ok(builder.build()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The spinner covers progress for `extract`; keep library logs quiet
    // unless asked for.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || matches!(cli.command, Command::Extract(_)) {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Extract(args) => run_extract(args, cli.quiet).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = args.model.to_config()?;
    tracing::info!(
        model = %config.model,
        pdf_policy = ?config.pdf_policy,
        concurrency = config.concurrency,
        "Extraction service configured"
    );

    let server_config = ServerConfig {
        host: args.host,
        port: args.port,
        max_body_bytes: args.max_body_bytes,
        cors: !args.no_cors,
    };
    server::serve(AppState::new(config), server_config)
        .await
        .context("HTTP server failed")
}

async fn run_extract(args: ExtractArgs, quiet: bool) -> Result<()> {
    let config = args.model.to_config()?;
    // Fail on a missing credential before reading any file.
    let backend = edgequake_invoice::pipeline::llm::resolve_backend(&config)?;

    let spinner = (!quiet).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_message(format!("Extracting {} file(s) with {}…", args.files.len(), backend.name()));
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let total = args.files.len();
    let result = extract_paths_with(backend.as_ref(), &args.files, &config).await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    let output = result?;

    if !quiet {
        eprintln!(
            "{}/{} invoice(s) extracted in {:.1}s",
            output.succeeded(),
            total,
            output.duration_ms as f64 / 1000.0
        );
        for file in output.files.iter().filter(|f| f.outcome.is_err()) {
            if let Err(ref e) = file.outcome {
                eprintln!(
                    "  ✗ {}: {}",
                    file.file_name.as_deref().unwrap_or("?"),
                    e
                );
            }
        }
    }

    let rendered = match args.format {
        FormatArg::Json => {
            // One file prints the bare invoice, like `POST /extract`.
            let value = match output.invoices_json().as_slice() {
                [single] => single.clone(),
                all => serde_json::json!({ "invoices": all }),
            };
            let mut s = serde_json::to_string_pretty(&value)?;
            s.push('\n');
            s
        }
        FormatArg::Csv => export::batch_to_csv(&output)?,
    };

    match args.output {
        Some(path) => std::fs::write(&path, rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => io::stdout().write_all(rendered.as_bytes())?,
    }
    Ok(())
}
