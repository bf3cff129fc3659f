//! # otpmig
//!
//! Command-line front end over `otpmig-otp` and `otpmig-live`.

pub mod cli;
pub mod commands;
pub mod logging;

use std::io::Write;

use chrono::Utc;
use otpmig_otp::migration::{OtpEngine, PngQrEncoder, QrEncoder};

use crate::cli::Cli;
use crate::commands::CommandResult;

/// Dispatch parsed flags to the matching command.
pub async fn run(cli: Cli) -> CommandResult<()> {
    let mut out = std::io::stdout();
    let encoder = PngQrEncoder::default();

    if let Some(path) = &cli.file {
        commands::build_from_file(path, cli.batch_size, &cli.workdir, &cli.prefix, &encoder, &mut out)?;
        return Ok(());
    }

    let Some(link) = cli.link.as_deref() else {
        return Err("either --link or --file is required".into());
    };

    if let Some(addr) = &cli.http {
        commands::serve_link(link, addr, cli.config.as_deref()).await?;
        return Ok(());
    }

    if cli.eval {
        let engine = match &cli.config {
            Some(p) => otpmig_live::live::LiveConfig::from_json_file(p)?.engine(),
            None => OtpEngine::default(),
        };
        commands::print_codes(link, &engine, Utc::now(), &mut out)?;
    } else {
        let qr = cli.qr.then_some((&encoder as &dyn QrEncoder, cli.workdir.as_path()));
        commands::print_credentials(link, cli.strict, qr, &mut out)?;
    }
    out.flush()?;
    Ok(())
}
