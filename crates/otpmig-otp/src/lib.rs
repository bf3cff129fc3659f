//! # otpmig – Authenticator migration toolkit
//!
//! Converts authenticator "transfer accounts" exports into individual
//! credentials and back:
//!
//! - **Migration codec** – `otpauth-migration://offline?data=…` ⇄ batch structure,
//!   via a hand-rolled protobuf wire codec
//! - **otpauth:// URIs** – deterministic credential URI generation
//! - **RFC 4226 / 6238** – HOTP & TOTP evaluation with SHA-1, SHA-256, SHA-512, MD5
//! - **Batch building** – credential URI lists → migration batches, with
//!   lossy secret recovery
//! - **QR Codes** – PNG rendering of any URI behind the `QrEncoder` seam

pub mod migration;
