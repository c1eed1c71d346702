pub mod task;

use crate::api::error::Result;
use crate::api::response::ResponseWrapper;
use crate::auth::epoch_millis;

/// `GET /v1/time` — current server time in epoch milliseconds. Ungated;
/// clients call this to sync their clock before signing requests.
pub async fn server_time() -> Result<ResponseWrapper<u64>> {
    Ok(ResponseWrapper::success(epoch_millis()?))
}

/// `GET /health` — liveness probe.
pub async fn health() -> ResponseWrapper<&'static str> {
    ResponseWrapper::success("ok")
}
