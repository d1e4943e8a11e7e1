//! dmlgen - generates Rust entities from MySQL table metadata
//!
//! This binary reads a JSON `GenerateRequest` from stdin and writes a JSON
//! `GenerateResponse` to stdout. Failures are reported in the response's
//! `error` field; only I/O errors end the process with a non-zero status.

use dmlgen::request::GenerateResponse;
use std::io::{self, Read, Write};
use tracing_subscriber::filter::LevelFilter;

fn main() {
    init_logging();
    if let Err(e) = run() {
        eprintln!("dmlgen: {}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let level = if std::env::var("DMLGEN_DEBUG").is_ok() {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut buf = Vec::new();
    io::stdin().read_to_end(&mut buf)?;

    let response =
        dmlgen::generate_from_bytes(&buf).unwrap_or_else(|e| GenerateResponse::from_error(&e));

    for f in &response.files {
        tracing::debug!(name = %f.name, bytes = f.content.len(), "generated file");
    }
    if let Some(err) = &response.error {
        tracing::debug!(error = %err, "generation failed");
    }

    let out = serde_json::to_vec(&response)?;
    io::stdout().write_all(&out)?;
    Ok(())
}
