use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::Parser;
use serde_json::{Value, json};
use walkdir::WalkDir;

/// Walk a directory for PDF files and post each one to a running docpipe
/// server.
#[derive(Parser)]
#[command(
    name = "docpipe-ingest",
    about = "Bulk-ingest a directory of PDFs into a docpipe server"
)]
struct Cli {
    /// Directory to scan recursively for .pdf files.
    #[arg(long)]
    dir: PathBuf,
    /// Tenant the documents belong to.
    #[arg(long)]
    tenant: String,
    /// Base URL of the docpipe server.
    #[arg(long, default_value = "http://127.0.0.1:4200")]
    server: String,
    /// Chunking strategy override (sentence, paragraph, fixed_size, semantic).
    #[arg(long)]
    strategy: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    if !cli.dir.is_dir() {
        bail!("{} is not a directory", cli.dir.display());
    }

    let client = reqwest::Client::builder()
        .user_agent("docpipe-ingest/0.2")
        .build()
        .context("failed to build HTTP client")?;
    let endpoint = format!("{}/documents", cli.server.trim_end_matches('/'));

    let mut ingested = 0usize;
    let mut failed = 0usize;

    for entry in WalkDir::new(&cli.dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
    {
        let path = entry.path();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        let mut payload = json!({
            "tenant_id": cli.tenant,
            "filename": filename,
            "content_base64": BASE64.encode(&bytes),
        });
        if let Some(strategy) = &cli.strategy {
            payload["chunking"] = json!({ "strategy": strategy });
        }

        let response = client
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("failed to reach {endpoint}"))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .unwrap_or_else(|_| json!({ "success": false }));

        if status.is_success() && body["success"] == Value::Bool(true) {
            ingested += 1;
            println!(
                "{}: document {} ({} chunks)",
                path.display(),
                body["document_id"].as_str().unwrap_or("?"),
                body["chunk_count"].as_u64().unwrap_or(0)
            );
        } else {
            failed += 1;
            eprintln!(
                "{}: {} ({})",
                path.display(),
                body["error"]["message"].as_str().unwrap_or("upload failed"),
                status
            );
        }
    }

    println!("done: {ingested} ingested, {failed} failed");
    if ingested == 0 && failed == 0 {
        println!("no .pdf files found under {}", cli.dir.display());
    }
    Ok(())
}
