use crate::domain::errors::{InvalidReason, MetricError};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// JSON error body: `{"message": "..."}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

/// A [`MetricError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub MetricError);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError(MetricError::Decode(message.into()))
    }
}

pub fn status_for(err: &MetricError) -> StatusCode {
    match err {
        MetricError::InvalidMetric(InvalidReason::UnknownKind(_)) => StatusCode::NOT_IMPLEMENTED,
        MetricError::InvalidMetric(InvalidReason::MissingId) => StatusCode::NOT_FOUND,
        MetricError::InvalidMetric(_) => StatusCode::BAD_REQUEST,
        MetricError::NoValue => StatusCode::NOT_FOUND,
        MetricError::SignatureMismatch { .. } => StatusCode::BAD_REQUEST,
        MetricError::Decode(_) | MetricError::Crypto(_) => StatusCode::BAD_REQUEST,
        MetricError::UntrustedSource(_) => StatusCode::FORBIDDEN,
        MetricError::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
        MetricError::Storage(_) | MetricError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<MetricError> for ApiError {
    fn from(err: MetricError) -> Self {
        ApiError(err)
    }
}

impl From<InvalidReason> for ApiError {
    fn from(reason: InvalidReason) -> Self {
        ApiError(MetricError::InvalidMetric(reason))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        }
        let message = match &self.0 {
            // Clients match on these short messages
            MetricError::InvalidMetric(reason) => reason.to_string(),
            other => other.to_string(),
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metric::MetricKind;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                MetricError::from(InvalidReason::UnknownKind("x".into())),
                StatusCode::NOT_IMPLEMENTED,
            ),
            (
                MetricError::from(InvalidReason::MissingId),
                StatusCode::NOT_FOUND,
            ),
            (
                MetricError::from(InvalidReason::MissingValue {
                    kind: MetricKind::Counter,
                }),
                StatusCode::BAD_REQUEST,
            ),
            (MetricError::NoValue, StatusCode::NOT_FOUND),
            (
                MetricError::SignatureMismatch { id: "a".into() },
                StatusCode::BAD_REQUEST,
            ),
            (
                MetricError::UntrustedSource("1.2.3.4".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                MetricError::Storage("down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{}", err);
        }
    }
}
