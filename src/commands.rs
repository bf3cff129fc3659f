//! The three CLI paths: print a migration link, pack a URI list into
//! batches, serve a link live.
//!
//! Results go to the supplied writer; diagnostics go through `tracing`.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use otpmig_live::live::{serve, LiveConfig};
use otpmig_otp::migration::{
    build_batches, decode_migration_uri, encode_entry_uri, qr::write_png, validate_entry,
    BuildSummary, MigrationBatch, OtpEngine, PngQrEncoder, QrEncoder,
};
use tokio::sync::watch;

pub type CommandResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Printed after `--qr` output.
pub const QR_REMINDER: &str = "Don't forget to delete qr_*.png from disk when done.";

/// Print one credential URI per entry. With `qr`, also write a PNG for each
/// into the given directory.
pub fn print_credentials(
    uri: &str,
    strict: bool,
    qr: Option<(&dyn QrEncoder, &Path)>,
    out: &mut dyn Write,
) -> CommandResult<usize> {
    let batch = decode_migration_uri(uri)?;
    for (idx, entry) in batch.entries.iter().enumerate() {
        validate_entry(entry, strict)?;
        let credential = encode_entry_uri(entry);
        writeln!(out, "{}", credential)?;
        if let Some((encoder, dir)) = qr {
            let path = dir.join(format!("qr_{}_{}.png", idx, entry.file_name()));
            write_png(encoder, &credential, &path)?;
            tracing::debug!("wrote {}", path.display());
        }
    }
    if qr.is_some() {
        writeln!(out, "{}", QR_REMINDER)?;
    }
    Ok(batch.len())
}

/// Print `<code> <name>` per entry as of `now`. Entries that cannot be
/// evaluated are reported and skipped.
pub fn print_codes(
    uri: &str,
    engine: &OtpEngine,
    now: DateTime<Utc>,
    out: &mut dyn Write,
) -> CommandResult<usize> {
    let mut batch = decode_migration_uri(uri)?;
    let mut printed = 0;
    for entry in batch.entries.iter_mut() {
        match engine.evaluate_string(entry, now) {
            Ok(code) => {
                writeln!(out, "{} {}", code, entry.name)?;
                printed += 1;
            }
            Err(e) => tracing::warn!("skipping '{}': {}", entry.name, e),
        }
    }
    Ok(printed)
}

/// Pack the credential URIs in `path` into migration batches, write one
/// `<prefix>_<n>.png` per non-empty batch into `workdir` and print the
/// migration links followed by a summary.
pub fn build_from_file(
    path: &Path,
    batch_size: usize,
    workdir: &Path,
    prefix: &str,
    encoder: &dyn QrEncoder,
    out: &mut dyn Write,
) -> CommandResult<BuildSummary> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("reading {}: {}", path.display(), e))?;
    let builds = build_batches(&text, batch_size)?;
    let summary = BuildSummary::from_builds(&builds);
    writeln!(
        out,
        "Found {} otpauth URLs, creating {} batches",
        summary.total_urls, summary.batch_count
    )?;

    std::fs::create_dir_all(workdir)?;
    for (idx, build) in builds.iter().enumerate() {
        let n = idx + 1;
        let Some(link) = build.migration_uri() else {
            writeln!(out, "Skipping batch {}: no valid OTP parameters found", n)?;
            continue;
        };
        let file = workdir.join(format!("{}_{}.png", prefix, n));
        if let Err(e) = write_png(encoder, &link, &file) {
            tracing::error!("QR code for batch {} failed: {}", n, e);
            continue;
        }
        writeln!(
            out,
            "Created batch {} QR code: {} (with {} valid URLs)",
            n,
            file.display(),
            build.batch.len()
        )?;
        writeln!(out, "{}", link)?;
    }

    writeln!(out)?;
    writeln!(out, "{}", summary)?;
    Ok(summary)
}

/// Serve `uri` live until Ctrl-C.
pub async fn serve_link(uri: &str, bind: &str, config_path: Option<&Path>) -> CommandResult<MigrationBatch> {
    let batch = decode_migration_uri(uri)?;
    let mut config = match config_path {
        Some(p) => LiveConfig::from_json_file(p)?,
        None => LiveConfig::default(),
    };
    config.bind = bind.to_string();

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
        }
        let _ = tx.send(true);
    });

    tracing::info!("serving {} entries on {}", batch.len(), config.bind);
    let qr: Arc<dyn QrEncoder> = Arc::new(PngQrEncoder::default());
    Ok(serve(batch, config, qr, rx).await?)
}
