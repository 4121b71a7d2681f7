use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use serde_json::json;

/// Every route returns `Result<T, AppError>` and Rocket renders the `Err`
/// arm directly, so handlers never build ad hoc `(Status, Json<Value>)`
/// tuples by hand.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("authentication required")]
    AuthN,
    #[error("forbidden")]
    AuthZ(String),
    #[error("not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rate limited")]
    RateLimited { retry_after_secs: u64, limit: usize },
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("store error")]
    Store(#[from] rusqlite::Error),
    #[error("external service error: {0}")]
    External(String),
}

impl AppError {
    pub fn invalid_json() -> Self {
        AppError::Validation("invalid_json".into())
    }

    fn status(&self) -> Status {
        match self {
            AppError::Validation(_) => Status::BadRequest,
            AppError::AuthN => Status::Unauthorized,
            AppError::AuthZ(_) => Status::Forbidden,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Conflict(_) => Status::Conflict,
            AppError::RateLimited { .. } => Status::TooManyRequests,
            AppError::PayloadTooLarge => Status::PayloadTooLarge,
            AppError::Store(_) | AppError::External(_) => Status::InternalServerError,
        }
    }

    /// Stable machine-readable code for clients that want to branch (e.g. `invalid_limit`).
    fn code(&self) -> Option<&'static str> {
        match self {
            AppError::Validation(msg) if msg == "invalid_json" => Some("invalid_json"),
            AppError::Conflict(msg) if msg.contains("username") => Some("duplicate_username"),
            _ => None,
        }
    }

    fn user_message(&self) -> String {
        match self {
            // Technical detail stays in the logs; the wire message is generic for 5xx kinds.
            AppError::Store(e) => {
                tracing::error!(error = %e, "store error");
                "internal error, please retry".to_string()
            }
            AppError::External(detail) => {
                tracing::error!(error = %detail, "external service error");
                "a dependent service is unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        let code = self.code();
        let retry_after = if let AppError::RateLimited { retry_after_secs, .. } = &self {
            Some(*retry_after_secs)
        } else {
            None
        };
        let mut body = json!({ "error": self.user_message() });
        if let Some(code) = code {
            body["code"] = json!(code);
        }

        let mut response = Response::build_from(Json(body).respond_to(req)?)
            .status(status)
            .finalize();
        if let Some(secs) = retry_after {
            response.set_header(rocket::http::Header::new("Retry-After", secs.to_string()));
        }
        Ok(response)
    }
}

pub type AppResult<T> = Result<T, AppError>;
