use thiserror::Error;

#[derive(Error, Debug)]
pub enum NewsError {
    #[error("news provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to deserialize provider response: {0}")]
    Deserialization(String),

    #[error("news provider is not configured")]
    MissingConfig,

    #[error("LLM analyser returned an unparseable response: {0}")]
    AnalyserParse(String),
}
