use ethers::{
    providers::{Provider, Ws},
    types::U256,
};
use eyre::{eyre, Result};
use rust_decimal::Decimal;
use std::env;
use tracing::{error, warn};

pub fn get_env(var: &str) -> String {
    env::var(var).unwrap_or_else(|_| panic!("Required environment variable \"{}\" not set", var))
}

/// 1 METIS in wei; the campaign eligibility threshold.
pub fn one_metis() -> Decimal {
    Decimal::from(1_000_000_000_000_000_000u64)
}

/// Wei amounts arrive as `U256`; Postgres stores them as numeric. Amounts
/// beyond `Decimal`'s 28-digit mantissa are an error, not a silent clamp.
pub fn u256_to_decimal(value: U256) -> Result<Decimal> {
    Decimal::from_str_exact(&value.to_string())
        .map_err(|e| eyre!("amount {} does not fit in a decimal: {}", value, e))
}

pub async fn create_rpc_connection(rpc_url: &String) -> Provider<Ws> {
    let mut num_retries = 0;
    let delay_base: u64 = 2;

    loop {
        match connect_with_reconnects(rpc_url).await {
            Some(p) => return p,
            None => {
                warn!(
                    "Failed to connect to RPC at {}, retry attempt #{}",
                    rpc_url, num_retries
                );
                tokio::time::sleep(tokio::time::Duration::from_secs(
                    delay_base.pow(num_retries),
                ))
                .await;
                if num_retries > 0 && num_retries % 4 == 0 {
                    error!("Failed repeatedly to connect to RPC at {}", rpc_url);
                }
                num_retries += 1;
            }
        }
    }
}

async fn connect_with_reconnects(rpc_url: &String) -> Option<Provider<Ws>> {
    match Provider::<Ws>::connect_with_reconnects(rpc_url, 0).await {
        Ok(p) => Some(p),
        Err(e) => {
            warn!("Stream reconnect attempt failed: {e}");
            None
        }
    }
}
