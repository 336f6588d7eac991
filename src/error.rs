use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed store reply: {0}")]
    Wire(String),

    #[error("Unknown store command: {0}")]
    UnknownCommand(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Store refused: {0}")]
    Refused(String),

    #[error("Invalid date '{0}' (expected YYYY-MM-DD)")]
    BadDate(String),

    #[error("Invalid amount '{0}'")]
    BadAmount(String),

    #[error("Wrong passphrase")]
    BadPassphrase,

    #[error("Database is locked; unlock it first")]
    Locked,

    #[error("Row {row}: {reason}")]
    ImportRow { row: usize, reason: String },

    #[error("{0}")]
    Validation(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TallyError>;
