use thiserror::Error;

#[derive(Error, Debug)]
pub enum RadiantError {
    #[error("Missing API credential: set {0} or model.api_key")]
    MissingCredential(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Model client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Failures against the turn store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
