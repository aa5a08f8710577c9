/// Failures raised by a secrets resolver. Raw backend responses and secret
/// values are never part of the message.
#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("secret configuration '{0}' not found")]
    NotFound(String),

    #[error("secret configuration '{name}' is malformed: {reason}")]
    MalformedBundle { name: String, reason: String },

    #[error("secrets backend authentication failed (check token permissions)")]
    Unauthorized,

    #[error("network error communicating with the secrets backend")]
    Network(#[source] reqwest::Error),

    #[error("unexpected secrets backend response: status {0}")]
    UnexpectedStatus(u16),
}
