//! Error type for the live server.

use otpmig_otp::migration::MigrationError;

#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),
}

pub type LiveResult<T> = Result<T, LiveError>;

#[cfg(test)]
mod tests {
    use super::*;
    use otpmig_otp::migration::MigrationErrorKind;

    #[test]
    fn display_includes_context() {
        let err = LiveError::Bind {
            addr: "127.0.0.1:1".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:1: in use");
    }

    #[test]
    fn migration_errors_convert() {
        let err: LiveError = MigrationError::validation("secret is empty").into();
        match err {
            LiveError::Migration(inner) => assert_eq!(inner.kind, MigrationErrorKind::ValidationFailed),
            other => panic!("unexpected {:?}", other),
        }
    }
}
