use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Plan error: {0}")]
    Plan(String),

    #[error("Transform error: {cause}")]
    Transform { cause: String, code: String },

    #[error("Data preparation failed after {attempts} attempts: {last_error}")]
    Preparation { attempts: u8, last_error: String },

    #[error("AI boundary contract violation: {0}")]
    BoundaryContract(String),

    #[error("Card directive error: {0}")]
    DomAction(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Snapshot store error: {0}")]
    Store(String),

    #[error("Ingestion error: {0}")]
    Ingest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
