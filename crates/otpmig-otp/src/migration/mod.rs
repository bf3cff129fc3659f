//! Migration crate: sub-modules.

pub mod types;
pub mod wire;
pub mod codec;
pub mod engine;
pub mod batch;
pub mod qr;

// Re-export top-level items for convenience.
pub use types::*;
pub use codec::{
    convert_migration_uri, decode_migration_bytes, decode_migration_uri, encode_entry_uri,
    encode_migration_bytes, encode_migration_uri, normalize_name, validate_entry,
};
pub use engine::{format_code, hotp_value, OtpEngine};
pub use batch::{
    add_base32_padding, build_batch, build_batches, group_into_batches, parse_lines, BatchBuild,
    BuildSummary,
};
pub use qr::{entry_png, write_png, PngQrEncoder, QrEncoder};
