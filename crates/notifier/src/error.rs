use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook endpoint returned {status}: {body}")]
    WebhookRejected { status: u16, body: String },
}
