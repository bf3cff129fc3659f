//! Reverse direction: lines of `otpauth://` URIs → migration batches.
//!
//! Bad URLs never abort a batch. They are logged, kept in
//! [`BatchBuild::skipped`] and left out of the payload.

use std::fmt;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::migration::codec::{encode_migration_uri, normalize_name};
use crate::migration::types::*;

/// Every built batch carries this payload version.
pub const BATCH_VERSION: i32 = 1;
/// Batch id stamped on built batches.
pub const DEFAULT_BATCH_ID: i64 = 1;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Input helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Keep the trimmed, non-empty lines that look like credential URIs.
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && l.starts_with(CREDENTIAL_PREFIX))
        .map(String::from)
        .collect()
}

/// Split `urls` into consecutive groups of at most `batch_size`.
pub fn group_into_batches(urls: &[String], batch_size: usize) -> Vec<Vec<String>> {
    urls.chunks(batch_size.max(1)).map(|c| c.to_vec()).collect()
}

/// Pad a base32 string with `=` to a multiple of 8 characters.
pub fn add_base32_padding(s: &str) -> String {
    let rem = s.len() % 8;
    if rem == 0 {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 8 - rem);
    out.push_str(s);
    out.extend(std::iter::repeat('=').take(8 - rem));
    out
}

/// Decode padded RFC 4648 base32, rejecting data lengths that no byte
/// string encodes to (1, 3 or 6 characters past a full quantum).
fn decode_base32(padded: &str) -> Option<Vec<u8>> {
    if matches!(padded.trim_end_matches('=').len() % 8, 1 | 3 | 6) {
        return None;
    }
    base32::decode(base32::Alphabet::Rfc4648 { padding: true }, padded)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Build result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One built batch plus what happened to its input lines.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchBuild {
    pub batch: MigrationBatch,
    /// Number of URLs handed to this batch.
    pub input_count: usize,
    /// One `EntrySkipped` error per URL left out.
    pub skipped: Vec<MigrationError>,
    /// URLs whose secret was not base32 and was kept as raw text.
    pub recovered: Vec<String>,
}

impl BatchBuild {
    /// The `otpauth-migration://` link for this batch, or `None` when no entry survived.
    pub fn migration_uri(&self) -> Option<String> {
        if self.batch.is_empty() {
            None
        } else {
            Some(encode_migration_uri(&self.batch))
        }
    }
}

/// Totals across a run of [`build_batches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildSummary {
    pub total_urls: usize,
    pub processed_urls: usize,
    pub skipped_urls: usize,
    pub batch_count: usize,
    pub non_empty_batches: usize,
}

impl BuildSummary {
    pub fn from_builds(builds: &[BatchBuild]) -> Self {
        let total_urls: usize = builds.iter().map(|b| b.input_count).sum();
        let processed_urls: usize = builds.iter().map(|b| b.batch.len()).sum();
        Self {
            total_urls,
            processed_urls,
            skipped_urls: total_urls - processed_urls,
            batch_count: builds.len(),
            non_empty_batches: builds.iter().filter(|b| !b.batch.is_empty()).count(),
        }
    }
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== SUMMARY ===")?;
        writeln!(f, "Total URLs found: {}", self.total_urls)?;
        writeln!(f, "Valid URLs processed: {}", self.processed_urls)?;
        writeln!(f, "Skipped URLs: {}", self.skipped_urls)?;
        write!(
            f,
            "Successfully processed batches: {} out of {}",
            self.non_empty_batches, self.batch_count
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Building
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Parsed {
    Entry(OtpEntry),
    Recovered(OtpEntry),
}

fn parse_credential(raw: &str) -> Result<Parsed, MigrationError> {
    let url = Url::parse(raw)
        .map_err(|e| MigrationError::skipped(format!("invalid URL format: {}", e), raw))?;
    if url.scheme() != CREDENTIAL_SCHEME {
        return Err(MigrationError::skipped(
            format!("invalid URL scheme '{}'", url.scheme()),
            raw,
        ));
    }

    let param = |key: &str| {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default()
    };

    let secret = param("secret");
    if secret.is_empty() {
        return Err(MigrationError::skipped("missing secret parameter", raw));
    }
    let padded = add_base32_padding(&secret);
    let (secret, recovered) = match decode_base32(&padded) {
        Some(bytes) => (bytes, false),
        None => (padded.into_bytes(), true),
    };

    let issuer = param("issuer");
    let path = percent_decode_str(url.path()).decode_utf8_lossy();

    let mut entry = OtpEntry::new(normalize_name(&path, &issuer), secret)
        .with_issuer(issuer)
        .with_algorithm(Algorithm::from_uri_param(&param("algorithm")))
        .with_digits(DigitCount::from_uri_param(&param("digits")));

    entry = match url.host_str() {
        Some("hotp") => entry.as_hotp(param("counter").trim().parse().unwrap_or(0)),
        _ => entry.with_type(OtpType::Totp),
    };

    Ok(if recovered {
        Parsed::Recovered(entry)
    } else {
        Parsed::Entry(entry)
    })
}

/// Build one migration batch from credential URIs.
///
/// `batch_index` is zero-based and `batch_count` is the number of batches in
/// the whole run.
pub fn build_batch(urls: &[String], batch_index: usize, batch_count: usize) -> BatchBuild {
    let mut build = BatchBuild {
        batch: MigrationBatch {
            version: BATCH_VERSION,
            batch_size: batch_count as i32,
            batch_index: batch_index as i32,
            batch_id: DEFAULT_BATCH_ID,
            entries: Vec::with_capacity(urls.len()),
        },
        input_count: urls.len(),
        ..Default::default()
    };

    for raw in urls {
        match parse_credential(raw) {
            Ok(Parsed::Entry(entry)) => build.batch.entries.push(entry),
            Ok(Parsed::Recovered(entry)) => {
                log::warn!("secret is not base32, using it as plain text: {}", raw);
                build.recovered.push(raw.clone());
                build.batch.entries.push(entry);
            }
            Err(e) => {
                log::warn!("skipping: {}", e);
                build.skipped.push(e);
            }
        }
    }

    log::debug!(
        "batch {}/{}: {} entries, {} skipped",
        batch_index + 1,
        batch_count,
        build.batch.len(),
        build.skipped.len()
    );
    build
}

/// Parse `text`, group it and build every batch.
pub fn build_batches(text: &str, batch_size: usize) -> Result<Vec<BatchBuild>, MigrationError> {
    let urls = parse_lines(text);
    if urls.is_empty() {
        return Err(MigrationError::validation("no otpauth:// URLs found"));
    }
    let groups = group_into_batches(&urls, batch_size);
    log::info!("found {} otpauth URLs, creating {} batches", urls.len(), groups.len());

    let count = groups.len();
    Ok(groups
        .iter()
        .enumerate()
        .map(|(idx, group)| build_batch(group, idx, count))
        .collect())
}
