use thiserror::Error;

use super::types::ApiMessage;

#[derive(Error, Debug)]
pub enum CloudflareError {
    #[error("unexpected HTTP status while {operation}: {status}")]
    UnexpectedStatus { operation: String, status: u16 },

    #[error("Cloudflare API reported failure while {operation}: {}", format_messages(.errors))]
    ApiFailure {
        operation: String,
        errors: Vec<ApiMessage>,
    },

    #[error("zone {0:?} not found")]
    ZoneNotFound(String),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),
}

fn format_messages(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "no error details".to_string();
    }
    errors
        .iter()
        .map(|err| format!("[{}] {}", err.code, err.message))
        .collect::<Vec<_>>()
        .join("; ")
}
