use anyhow::Context;

use crate::api::error::{Error, Result};

/// Reconstructs the exact string the client signed: the raw query component
/// (everything after the first `?`, still percent-encoded on the wire) run
/// through a single percent-decoding pass.
///
/// Decoder: `urlencoding::decode`. Malformed `%` escapes are passed through
/// verbatim; the only hard failure is decoded bytes that are not valid
/// UTF-8, which surfaces on the unexpected-error path rather than being
/// swallowed.
pub fn normalize_query(raw_query: Option<&str>) -> Result<String> {
    let raw = raw_query.unwrap_or("");
    let decoded = urlencoding::decode(raw)
        .context("query string did not decode to valid UTF-8")
        .map_err(Error::Unexpected)?;
    Ok(decoded.into_owned())
}
