use crate::api::error::{Error, Result};

/// Largest tolerance, in milliseconds, a client may request for how far its
/// timestamp can run ahead of server time. Binance API constant.
pub const MAX_RECV_WINDOW_MS: u64 = 10_000;

/// Fixed grace period before server time beyond which a timestamp is
/// considered stale.
pub const STALENESS_WINDOW_MS: i128 = 3_000;

/// Validated freshness parameters, attached to the request context by the
/// gate for downstream reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvWindowParams {
    pub recv_window: u64,
    pub timestamp: u64,
}

/// A decimal digit string classified by magnitude. Values too large for
/// `u128` are still well *typed*; they can only fail a *range* check, which
/// keeps the semantics of the platform's arbitrary-precision integers
/// without carrying a bigint dependency.
enum Magnitude {
    Fits(u128),
    TooLarge,
}

fn parse_unsigned_decimal(value: &str) -> Option<Magnitude> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match value.trim_start_matches('0').parse::<u128>() {
        Ok(parsed) => Some(Magnitude::Fits(parsed)),
        // all-zero strings trim to "", which is zero
        Err(_) if value.trim_start_matches('0').is_empty() => Some(Magnitude::Fits(0)),
        Err(_) => Some(Magnitude::TooLarge),
    }
}

/// Bounds-checks `recvWindow` and `timestamp` against `server_time_ms`.
///
/// The check order is part of the contract: type errors are reported before
/// range errors, and `recvWindow` is fully validated before `timestamp` is
/// range-checked, because the timestamp window depends on a valid
/// `recvWindow`. The caller captures `server_time_ms` exactly once.
pub fn check_recv_window(
    recv_window: Option<&str>,
    timestamp: Option<&str>,
    server_time_ms: u64,
) -> Result<RecvWindowParams> {
    let recv_window = recv_window
        .and_then(parse_unsigned_decimal)
        .ok_or_else(|| {
            Error::InvalidArgument("recvWindow should be of type unsigned long".to_string())
        })?;

    let timestamp = timestamp.and_then(parse_unsigned_decimal).ok_or_else(|| {
        Error::InvalidArgument("timestamp should be of type unsigned long".to_string())
    })?;

    let recv_window = match recv_window {
        // an over-long digit string is necessarily > 10000
        Magnitude::TooLarge => return Err(Error::InvalidRecvWindow),
        Magnitude::Fits(value) if value > MAX_RECV_WINDOW_MS as u128 => {
            return Err(Error::InvalidRecvWindow)
        }
        Magnitude::Fits(value) => value as u64,
    };

    let timestamp = match timestamp {
        // an over-long digit string is necessarily >= serverTime + recvWindow
        Magnitude::TooLarge => return Err(Error::InvalidTimestamp),
        Magnitude::Fits(value) => value,
    };

    // accepted iff serverTime - 3000 < timestamp < serverTime + recvWindow
    let server_time = server_time_ms as i128;
    let timestamp_wide = timestamp as i128;
    if server_time - STALENESS_WINDOW_MS >= timestamp_wide
        || timestamp_wide >= server_time + recv_window as i128
    {
        return Err(Error::InvalidTimestamp);
    }

    Ok(RecvWindowParams {
        recv_window,
        // in range around server time, so it fits
        timestamp: timestamp as u64,
    })
}
