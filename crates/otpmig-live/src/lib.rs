//! # otpmig-live
//!
//! Serves a decoded migration batch as a live OTP feed:
//!
//! - **Broker** – bounded per-subscriber queues, lossy when a viewer lags
//! - **Producer** – single owner of the batch, evaluates every entry per tick
//! - **Server** – `axum` routes for the event stream, listings and QR images

pub mod live;
