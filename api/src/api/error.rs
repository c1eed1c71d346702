use axum::response::IntoResponse;
use tracing::error;

use super::response::{ResponseCode, ResponseWrapper};

/// Error type returned by handlers and by the request gate.
///
/// Every variant renders as exactly one enveloped response; nothing here
/// escapes to a framework error page. Rejections are plain values (no
/// control-flow sentinel): returning `Err` from an extractor or handler is
/// what stops the request.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid recvWindow: recvWindow should be of less or equal to 10000")]
    InvalidRecvWindow,

    #[error("timestamp should be between serverTime - 3000 and serverTime + recvWindow")]
    InvalidTimestamp,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Anything the gate or a handler did not anticipate (decode crash, RPC
    /// failure, ...). The upstream service responds to these with HTTP 500
    /// but payload code `000006` (`InvalidArgument`); that mismatch is part
    /// of the wire contract and is preserved here.
    #[error("invalid argument")]
    Unexpected(#[from] anyhow::Error),
}

impl Error {
    pub fn response_code(&self) -> ResponseCode {
        match self {
            Self::InvalidSignature => ResponseCode::InvalidSignature,
            Self::InvalidRecvWindow => ResponseCode::InvalidRecvWindow,
            Self::InvalidTimestamp => ResponseCode::InvalidTimestamp,
            Self::InvalidArgument(_) => ResponseCode::InvalidArgument,
            Self::Unexpected(_) => ResponseCode::InvalidArgument,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        if let Self::Unexpected(ref e) = self {
            error!("unexpected error while handling request: {:?}", e);
            let wrapper = ResponseWrapper::<()> {
                code: ResponseCode::InvalidArgument,
                message: "invalid argument".to_string(),
                data: None,
            };
            return (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(wrapper),
            )
                .into_response();
        }

        ResponseWrapper::<()> {
            code: self.response_code(),
            message: self.to_string(),
            data: None,
        }
        .into_response()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
