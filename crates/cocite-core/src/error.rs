use thiserror::Error;

/// All errors that can occur in cocite-core.
#[derive(Debug, Error)]
pub enum CocitationError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Process exit codes used by the CLI.
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidArgs = 3,
    FileSystemError = 4,
    NoSeeds = 5,
}

pub type Result<T> = std::result::Result<T, CocitationError>;
