pub mod query;
pub mod recv_window;
pub mod rsa;

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use tracing::debug;

use crate::api::{
    error::{Error, Result},
    ApiContext,
};
use query::normalize_query;
use recv_window::{check_recv_window, RecvWindowParams};

/// The request gate. Extracting this from a request runs, in order:
///
/// 1. signature verification over the normalized query string;
/// 2. the recvWindow/timestamp freshness check.
///
/// The first failing check rejects the request; the later check never runs.
/// Rejections are `Err` values rendered into exactly one enveloped response
/// by axum, so there is no "response already written" state to guard.
pub struct RequestGate {
    pub params: RecvWindowParams,
}

/// The `signature` header must carry exactly one value. A repeated header is
/// an explicit rejection, not a pick-first fallback.
enum SignatureHeader<'a> {
    Absent,
    Scalar(&'a axum::http::HeaderValue),
    MultiValued,
}

fn signature_header(headers: &HeaderMap) -> SignatureHeader<'_> {
    let mut values = headers.get_all("signature").iter();
    match (values.next(), values.next()) {
        (None, _) => SignatureHeader::Absent,
        (Some(value), None) => SignatureHeader::Scalar(value),
        (Some(_), Some(_)) => SignatureHeader::MultiValued,
    }
}

/// Pulls `recvWindow` and `timestamp` out of the raw query string without
/// losing their textual form; the validator is the one that decides whether
/// the text is a well-formed unsigned integer.
///
/// A repeated parameter is a list, not an unsigned long, and is rejected
/// with the same type error a non-numeric value gets.
fn freshness_params(raw_query: &str) -> Result<(Option<String>, Option<String>)> {
    let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(raw_query)
        .context("could not parse query parameters")
        .map_err(Error::Unexpected)?;

    let mut recv_window = None;
    let mut timestamp = None;
    for (key, value) in pairs {
        match key.as_str() {
            "recvWindow" => {
                if recv_window.replace(value).is_some() {
                    return Err(Error::InvalidArgument(
                        "recvWindow should be of type unsigned long".to_string(),
                    ));
                }
            }
            "timestamp" => {
                if timestamp.replace(value).is_some() {
                    return Err(Error::InvalidArgument(
                        "timestamp should be of type unsigned long".to_string(),
                    ));
                }
            }
            _ => (),
        }
    }
    Ok((recv_window, timestamp))
}

pub(crate) fn epoch_millis() -> Result<u64> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the UNIX epoch")
        .map_err(Error::Unexpected)?;
    Ok(now.as_millis() as u64)
}

impl<S> FromRequestParts<S> for RequestGate
where
    ApiContext: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let ctx = ApiContext::from_ref(state);

        let signature = match signature_header(&parts.headers) {
            SignatureHeader::Scalar(value) => value.to_str().map_err(|_| {
                debug!("signature header is not valid UTF-8");
                Error::InvalidSignature
            })?,
            SignatureHeader::Absent => {
                debug!("signature header is missing");
                return Err(Error::InvalidSignature);
            }
            SignatureHeader::MultiValued => {
                debug!("signature header was supplied more than once");
                return Err(Error::InvalidSignature);
            }
        };

        let search = normalize_query(parts.uri.query())?;
        rsa::verify(&search, &ctx.config.rsa_public_key, signature)?;

        let (recv_window, timestamp) = freshness_params(parts.uri.query().unwrap_or(""))?;
        // captured once; both bounds are computed from this instant
        let server_time = epoch_millis()?;
        let params = check_recv_window(recv_window.as_deref(), timestamp.as_deref(), server_time)?;

        // make the validated values available to anything downstream that
        // prefers extensions over the extractor's fields
        parts.extensions.insert(params);

        Ok(RequestGate { params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_recv_window_is_a_type_error() {
        let err = freshness_params("recvWindow=5000&timestamp=10&recvWindow=9999").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(msg)
            if msg == "recvWindow should be of type unsigned long"));
    }

    #[test]
    fn repeated_timestamp_is_a_type_error() {
        let err = freshness_params("recvWindow=5000&timestamp=1&timestamp=2").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(msg)
            if msg == "timestamp should be of type unsigned long"));
    }

    #[test]
    fn freshness_params_decodes_values() {
        // a percent-encoded digit is still a digit after decoding
        let (recv_window, _) = freshness_params("recvWindow=%35000&timestamp=1").unwrap();
        assert_eq!(recv_window.as_deref(), Some("5000"));
    }

    #[test]
    fn missing_params_are_none() {
        let (recv_window, timestamp) = freshness_params("a=b").unwrap();
        assert!(recv_window.is_none());
        assert!(timestamp.is_none());
    }
}
