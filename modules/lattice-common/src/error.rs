use thiserror::Error;

#[derive(Error, Debug)]
pub enum LatticeError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Directory lookup error: {0}")]
    Lookup(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
