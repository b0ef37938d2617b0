use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;

/// Closed set of error kinds per the error handling design: every route
/// returns `Result<T, HiveError>` and gets the `{error: "..."}` envelope and
/// status code below for free.
#[derive(Debug, thiserror::Error)]
pub enum HiveError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Rate limited")]
    TooManyRequests { retry_after_secs: u64, limit: usize },

    #[error("Upstream fetch failed: {0}")]
    BadGateway(String),

    #[error("Internal error")]
    Internal(String),
}

impl HiveError {
    pub fn admin_required() -> Self {
        HiveError::Forbidden("Admin required".to_string())
    }

    fn status(&self) -> Status {
        match self {
            HiveError::BadRequest(_) => Status::BadRequest,
            HiveError::Unauthorized => Status::Unauthorized,
            HiveError::Forbidden(_) => Status::Forbidden,
            HiveError::NotFound(_) => Status::NotFound,
            HiveError::Conflict(_) => Status::Conflict,
            HiveError::PayloadTooLarge => Status::PayloadTooLarge,
            HiveError::TooManyRequests { .. } => Status::TooManyRequests,
            HiveError::BadGateway(_) => Status::BadGateway,
            HiveError::Internal(_) => Status::InternalServerError,
        }
    }
}

impl From<rusqlite::Error> for HiveError {
    fn from(e: rusqlite::Error) -> Self {
        tracing::error!(error = %e, "storage error");
        HiveError::Internal(e.to_string())
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for HiveError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        if matches!(self, HiveError::Internal(_)) {
            tracing::error!(error = %self, "internal error surfaced to client");
        }

        let status = self.status();
        let mut body = serde_json::json!({ "error": self.to_string() });
        if let HiveError::TooManyRequests { retry_after_secs, limit } = &self {
            body["retry_after_secs"] = serde_json::json!(retry_after_secs);
            body["limit"] = serde_json::json!(limit);
        }

        let mut response = Response::build_from(Json(body).respond_to(req)?)
            .status(status)
            .finalize();

        if let HiveError::TooManyRequests { retry_after_secs, .. } = &self {
            response.set_header(rocket::http::Header::new(
                "Retry-After",
                retry_after_secs.to_string(),
            ));
        }

        Ok(response)
    }
}

pub type HiveResult<T> = Result<T, HiveError>;
