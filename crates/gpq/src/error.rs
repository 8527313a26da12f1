use thiserror::Error;

/// Errors raised while reading or writing GeoParquet polygon tables.
#[derive(Error, Debug)]
pub enum GpqError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// The `geo` metadata document could not be encoded or decoded.
    #[error("geo metadata error: {0}")]
    Json(#[from] serde_json::Error),

    /// A geometry cell is not well-formed WKB, or holds a non-polygonal type.
    #[error("WKB error: {0}")]
    Wkb(String),

    #[error("missing column `{0}`")]
    MissingColumn(String),

    #[error("column `{column}` has unsupported type {found}")]
    ColumnType { column: String, found: String },
}

pub type Result<T> = std::result::Result<T, GpqError>;
