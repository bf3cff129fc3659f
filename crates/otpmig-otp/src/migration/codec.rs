//! `otpauth-migration://` ⇄ batch, and batch entry → `otpauth://` URI.
//!
//! Migration format: `otpauth-migration://offline?data=BASE64`, where the
//! base64 carries the protobuf payload handled by [`wire`](super::wire).
//!
//! Credential format:
//! `otpauth://TYPE/NAME?algorithm=…&counter=…&digits=…&issuer=…&period=30&secret=BASE32`
//! with parameters in ascending key order.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use url::form_urlencoded;
use url::Url;

use crate::migration::types::*;
use crate::migration::wire;

/// Characters escaped in the credential path. `:` and `@` stay literal so
/// `Issuer:account@host` labels read naturally.
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Migration URI
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decode an `otpauth-migration://offline?data=…` link into its batch.
pub fn decode_migration_uri(uri: &str) -> Result<MigrationBatch, MigrationError> {
    let url = Url::parse(uri.trim())
        .map_err(|e| MigrationError::format(format!("invalid URI: {}", e)).with_detail(uri))?;

    if url.scheme() != MIGRATION_SCHEME {
        return Err(MigrationError::format(format!("unknown scheme '{}'", url.scheme())));
    }
    match url.host_str() {
        Some(MIGRATION_HOST) => {}
        other => {
            return Err(MigrationError::format(format!(
                "unknown host '{}'",
                other.unwrap_or_default()
            )))
        }
    }

    let data = url
        .query_pairs()
        .find(|(k, _)| k == "data")
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default();

    // Form decoding turns '+' into ' '; base64 needs it back.
    let data = data.replace(' ', "+");
    let bytes = STANDARD
        .decode(data.as_bytes())
        .map_err(|e| MigrationError::decode(format!("base64: {}", e)))?;

    decode_migration_bytes(&bytes)
}

/// Deserialize a raw migration payload.
pub fn decode_migration_bytes(bytes: &[u8]) -> Result<MigrationBatch, MigrationError> {
    wire::decode_batch(bytes)
}

/// Serialize a batch to the raw migration payload.
pub fn encode_migration_bytes(batch: &MigrationBatch) -> Vec<u8> {
    wire::encode_batch(batch)
}

/// Encode a batch as an `otpauth-migration://` link.
pub fn encode_migration_uri(batch: &MigrationBatch) -> String {
    let data = STANDARD.encode(encode_migration_bytes(batch));
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("data", &data)
        .finish();
    format!("{}://{}?{}", MIGRATION_SCHEME, MIGRATION_HOST, query)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Credential URI
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Generate the `otpauth://` URI for one entry.
///
/// Output is deterministic: parameters are sorted by key, and `period=30`
/// or `counter=N` is always present depending on the type.
pub fn encode_entry_uri(entry: &OtpEntry) -> String {
    let secret = base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &entry.secret);

    let mut params: Vec<(&str, String)> = vec![("secret", secret)];
    if !entry.issuer.is_empty() {
        params.push(("issuer", entry.issuer.clone()));
    }
    if entry.algorithm != Algorithm::Unspecified {
        params.push(("algorithm", entry.algorithm.uri_name().to_string()));
    }
    if entry.digits != DigitCount::Unspecified {
        params.push(("digits", entry.digits.count().to_string()));
    }
    if entry.otp_type.is_hotp() {
        params.push(("counter", entry.counter.to_string()));
    } else {
        params.push(("period", PERIOD_SECS.to_string()));
    }
    params.sort_by(|a, b| a.0.cmp(b.0));

    let mut query = form_urlencoded::Serializer::new(String::new());
    for (k, v) in &params {
        query.append_pair(k, v);
    }

    format!(
        "{}://{}/{}?{}",
        CREDENTIAL_SCHEME,
        entry.otp_type.uri_name(),
        utf8_percent_encode(&entry.name, PATH_ENCODE_SET),
        query.finish()
    )
}

/// Strip one leading `/` and a redundant `issuer:` prefix from a label.
pub fn normalize_name(name: &str, issuer: &str) -> String {
    let name = name.strip_prefix('/').unwrap_or(name);
    if !issuer.is_empty() {
        if let Some(rest) = name.strip_prefix(issuer).and_then(|r| r.strip_prefix(':')) {
            return rest.to_string();
        }
    }
    name.to_string()
}

/// Check the fields a credential URI needs. Strict mode also rejects HOTP
/// entries whose counter was never set.
pub fn validate_entry(entry: &OtpEntry, strict: bool) -> Result<(), MigrationError> {
    if entry.secret.is_empty() {
        return Err(MigrationError::validation("secret is empty").with_detail(entry.name.clone()));
    }
    if strict && entry.otp_type.is_hotp() && entry.counter == 0 {
        return Err(MigrationError::validation("HOTP counter is missing").with_detail(entry.name.clone()));
    }
    Ok(())
}

/// Decode a migration link and emit one credential URI per entry.
pub fn convert_migration_uri(uri: &str, strict: bool) -> Result<Vec<String>, MigrationError> {
    let batch = decode_migration_uri(uri)?;
    batch
        .entries
        .iter()
        .map(|e| validate_entry(e, strict).map(|_| encode_entry_uri(e)))
        .collect()
}
