use flow_gate::FlowError;

/// Errors produced by the gate middleware.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GateError {
    /// A flow rule denied the request.
    ///
    /// When the `axum` feature is enabled, this converts to
    /// `429 Too Many Requests`.
    #[error("flow rule rejected resource {resource:?}")]
    Blocked {
        /// Name of the resource the request was gated on.
        resource: String,
    },

    /// An unexpected flow-control error. The admission pipeline itself fails
    /// open, so this only surfaces for misuse of the middleware.
    #[error("flow control error: {0}")]
    Inner(String),
}

impl From<FlowError> for GateError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::Blocked { resource, .. } => Self::Blocked { resource },
            other => Self::Inner(other.to_string()),
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for GateError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match self {
            Self::Blocked { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Inner(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
