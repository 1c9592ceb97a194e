use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapError {
    #[error("No data available: {0}")]
    NoData(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Could not parse flightday '{value}': {reason}")]
    DateParse { value: String, reason: String },

    #[error("Cleaning failed: {0}")]
    Cleaning(#[source] Box<ScrapError>),

    #[error("Non-numeric value {value} in measure column '{column}'")]
    InvalidMeasure { column: String, value: String },

    #[error("Row {row} cannot be grouped: {reason}")]
    Ungroupable { row: usize, reason: String },

    #[error("{0} is not available yet")]
    NotReady(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error: {message}")]
    Fetch { message: String },
}

impl ScrapError {
    /// Wrap a failure raised while cleaning so callers see a single cleaning error.
    pub fn cleaning(cause: ScrapError) -> Self {
        match cause {
            already @ ScrapError::Cleaning(_) => already,
            other => ScrapError::Cleaning(Box::new(other)),
        }
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapError::NoData(_) => "no_data",
            ScrapError::MissingColumn(_) => "missing_column",
            ScrapError::DateParse { .. } => "date_parse",
            ScrapError::Cleaning(_) => "cleaning",
            ScrapError::InvalidMeasure { .. } => "invalid_measure",
            ScrapError::Ungroupable { .. } => "ungroupable",
            ScrapError::NotReady(_) => "not_ready",
            ScrapError::Http(_) => "http",
            ScrapError::Json(_) => "json",
            ScrapError::Toml(_) => "toml",
            ScrapError::Io(_) => "io",
            ScrapError::Config(_) => "config",
            ScrapError::Fetch { .. } => "fetch",
        }
    }

    /// True for failures of the record source rather than of the batch itself.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ScrapError::NoData(_) | ScrapError::Http(_) | ScrapError::Fetch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ScrapError>;
