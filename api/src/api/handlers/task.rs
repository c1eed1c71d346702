use std::collections::{BTreeMap, BTreeSet};

use anyhow::Context;
use axum::extract::{RawQuery, State};
use ethers::types::Address;

use crate::api::error::{Error, Result};
use crate::api::response::ResponseWrapper;
use crate::api::ApiContext;
use crate::auth::RequestGate;
use crate::chain::one_metis;

const ALLOWED_TASK_NAMES: &[&str] = &["stake"];

#[derive(Debug)]
struct CompletionQuery {
    task: Option<String>,
    wallet_address: Option<String>,
}

/// Parses the completion parameters from the raw query. Done by hand rather
/// than through `Query<T>` so a malformed or repeated parameter still gets
/// the enveloped `InvalidArgument`, never a framework rejection page. A
/// repeated parameter is a list and fails the same check a non-string does.
fn completion_params(raw_query: &str) -> Result<CompletionQuery> {
    let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(raw_query)
        .context("could not parse query parameters")
        .map_err(Error::Unexpected)?;

    let mut task = None;
    let mut wallet_address = None;
    for (key, value) in pairs {
        match key.as_str() {
            "task" => {
                if task.replace(value).is_some() {
                    return Err(Error::InvalidArgument(
                        "task is not a list of string".to_string(),
                    ));
                }
            }
            "walletAddress" => {
                if wallet_address.replace(value).is_some() {
                    return Err(Error::InvalidArgument(
                        "walletAddress is not string".to_string(),
                    ));
                }
            }
            _ => (),
        }
    }
    Ok(CompletionQuery {
        task,
        wallet_address,
    })
}

pub fn is_evm_address(value: &str) -> bool {
    value.len() == 42
        && value.starts_with("0x")
        && value[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// `GET /v1/task/completion` — reports, per campaign task, whether the
/// wallet has completed it. Gated: the `RequestGate` argument runs signature
/// and freshness validation before anything here executes.
pub async fn completion(
    _gate: RequestGate,
    State(ctx): State<ApiContext>,
    RawQuery(raw_query): RawQuery,
) -> Result<ResponseWrapper<BTreeMap<String, bool>>> {
    let query = completion_params(raw_query.as_deref().unwrap_or(""))?;

    let tasks: Vec<String> = query
        .task
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .ok_or_else(|| Error::InvalidArgument("task is not a list of string".to_string()))?;

    if !tasks
        .iter()
        .all(|task| ALLOWED_TASK_NAMES.contains(&task.as_str()))
    {
        return Err(Error::InvalidArgument(
            "one of task element is not valid".to_string(),
        ));
    }

    let wallet_address = query
        .wallet_address
        .ok_or_else(|| Error::InvalidArgument("walletAddress is not string".to_string()))?;
    if !is_evm_address(&wallet_address) {
        return Err(Error::InvalidArgument(
            "walletAddress is not evm address".to_string(),
        ));
    }
    let wallet: Address = wallet_address
        .parse()
        .context("checked address failed to parse")
        .map_err(Error::Unexpected)?;

    let unique_tasks: BTreeSet<String> = tasks.into_iter().collect();

    let mut data = BTreeMap::new();
    for task in unique_tasks {
        match task.as_str() {
            "stake" => {
                let total = ctx
                    .stake_verifier
                    .total_metis_staked(wallet)
                    .await
                    .map_err(Error::Unexpected)?;
                data.insert(task, total >= one_metis());
            }
            // every element was checked against ALLOWED_TASK_NAMES above
            _ => (),
        }
    }

    Ok(ResponseWrapper::success(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_address_check() {
        assert!(is_evm_address(
            "0x52908400098527886E0F7030069857D2E4169EE7"
        ));
        assert!(is_evm_address(
            "0xde709f2102306220921060314715629080e2fb77"
        ));
        assert!(!is_evm_address("0xabcabc"));
        assert!(!is_evm_address(
            "52908400098527886E0F7030069857D2E4169EE7aa"
        ));
        assert!(!is_evm_address(
            "0x52908400098527886E0F7030069857D2E4169EEg"
        ));
        assert!(!is_evm_address(""));
    }

    #[test]
    fn completion_params_picks_named_parameters() {
        let query = completion_params(
            "walletAddress=0xabc&task=%5B%22stake%22%5D&recvWindow=5000&timestamp=1",
        )
        .unwrap();
        assert_eq!(query.task.as_deref(), Some(r#"["stake"]"#));
        assert_eq!(query.wallet_address.as_deref(), Some("0xabc"));
    }

    #[test]
    fn repeated_task_is_invalid_argument() {
        let err = completion_params("task=a&walletAddress=0xabc&task=b").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(msg)
            if msg == "task is not a list of string"));
    }

    #[test]
    fn repeated_wallet_address_is_invalid_argument() {
        let err = completion_params("walletAddress=0xabc&walletAddress=0xdef").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(msg)
            if msg == "walletAddress is not string"));
    }

    #[test]
    fn missing_parameters_are_none() {
        let query = completion_params("recvWindow=5000&timestamp=1").unwrap();
        assert!(query.task.is_none());
        assert!(query.wallet_address.is_none());
    }
}
