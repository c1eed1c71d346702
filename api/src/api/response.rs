use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Serialize, Serializer};

/// Service-level result codes shared by every endpoint. These are wire
/// constants consumed by the campaign platform; the string values must not
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    TooManyRequests,
    SystemBusy,
    InvalidSignature,
    InvalidRecvWindow,
    /// Timestamp for the request is outside of the recvWindow, or was more
    /// than 3000ms behind the server's time.
    InvalidTimestamp,
    InvalidArgument,
}

impl ResponseCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Success => "000000",
            Self::TooManyRequests => "000001",
            Self::SystemBusy => "000002",
            Self::InvalidSignature => "000003",
            Self::InvalidRecvWindow => "000004",
            Self::InvalidTimestamp => "000005",
            Self::InvalidArgument => "000006",
        }
    }

    /// Total mapping onto transport statuses. The unexpected-error path
    /// overrides this with 500 (see `Error`); everything else goes through
    /// here.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::SystemBusy => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::InvalidRecvWindow => StatusCode::BAD_REQUEST,
            Self::InvalidTimestamp => StatusCode::BAD_REQUEST,
            Self::InvalidArgument => StatusCode::BAD_REQUEST,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "000000" => Some(Self::Success),
            "000001" => Some(Self::TooManyRequests),
            "000002" => Some(Self::SystemBusy),
            "000003" => Some(Self::InvalidSignature),
            "000004" => Some(Self::InvalidRecvWindow),
            "000005" => Some(Self::InvalidTimestamp),
            "000006" => Some(Self::InvalidArgument),
            _ => None,
        }
    }
}

impl Serialize for ResponseCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.code())
    }
}

/// The envelope every endpoint responds with: `{ code, message, data }`.
#[derive(Debug, Serialize)]
pub struct ResponseWrapper<T: Serialize> {
    pub code: ResponseCode,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ResponseWrapper<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: ResponseCode::Success,
            message: "success".to_string(),
            data: Some(data),
        }
    }
}

impl<T: Serialize> IntoResponse for ResponseWrapper<T> {
    fn into_response(self) -> Response {
        let status = self.code.status();
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn code_status_mapping_is_total_and_injective() {
        let all = [
            ResponseCode::Success,
            ResponseCode::TooManyRequests,
            ResponseCode::SystemBusy,
            ResponseCode::InvalidSignature,
            ResponseCode::InvalidRecvWindow,
            ResponseCode::InvalidTimestamp,
            ResponseCode::InvalidArgument,
        ];
        for code in all {
            // every code round-trips through its wire string
            assert_eq!(ResponseCode::from_code(code.code()), Some(code));
        }
        let mut strings: Vec<&str> = all.iter().map(|c| c.code()).collect();
        strings.sort();
        strings.dedup();
        assert_eq!(strings.len(), all.len());
    }

    #[test]
    fn envelope_serializes_code_as_string() {
        let wrapper = ResponseWrapper::success(42u64);
        let json = serde_json::to_value(&wrapper).unwrap();
        assert_eq!(json["code"], "000000");
        assert_eq!(json["message"], "success");
        assert_eq!(json["data"], 42);
    }
}
