use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("InvalidData: {0}")]
    InvalidData(String),

    #[error("Config: {0}")]
    Config(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification callers use to decide how to degrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The data source could not be reached or opened.
    Connection,
    /// A well-formed request failed while executing.
    Query,
    /// Input data or configuration is malformed.
    Data,
}

impl MetricsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::Query(_) | Self::Polars(_) => ErrorKind::Query,
            Self::MissingColumn(_) | Self::InvalidData(_) | Self::Config(_) | Self::Io(_) => {
                ErrorKind::Data
            }
        }
    }

    pub fn is_connection(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }
}

pub type MetricsResult<T> = Result<T, MetricsError>;
