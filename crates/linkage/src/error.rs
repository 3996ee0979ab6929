use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkageError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (empty name, bad column list, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// A required column is absent from an input dataset.
    #[error("dataset '{dataset}': missing column '{column}'")]
    MissingColumn { dataset: String, column: String },
    /// A join key or record id occurs more than once.
    #[error("dataset '{dataset}': duplicate key '{key}'")]
    DuplicateKey { dataset: String, key: String },
    /// Geography merge with no geography column shared by both frames.
    #[error("merge '{name}': no shared reference-geography column to join on")]
    AmbiguousKey { name: String },
    /// Spatial operation on a row that carries no geometry.
    #[error("dataset '{dataset}', record '{id}': no geometry")]
    MissingGeometry { dataset: String, id: String },
    #[error("unknown area name: {0}")]
    UnknownArea(String),
    /// CSV read/write error.
    #[error("csv error: {0}")]
    Csv(String),
}

impl From<csv::Error> for LinkageError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e.to_string())
    }
}
