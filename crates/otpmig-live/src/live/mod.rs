pub mod broker;
pub mod config;
pub mod error;
pub mod producer;
pub mod server;

pub use broker::{encode_frame, Broker, Subscription};
pub use config::LiveConfig;
pub use error::LiveError;
pub use producer::{run_producer, tick, OtpEvent};
pub use server::{router, serve, serve_listener, AppState};
