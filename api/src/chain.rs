use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use ethers::{
    contract::abigen,
    providers::{Http, Provider},
    types::{Address, U256},
};

abigen!(StakeAndLock, "./src/abi/StakeAndLock.json",);

/// 1 METIS in wei; the stake threshold for campaign eligibility.
pub fn one_metis() -> U256 {
    U256::exp10(18)
}

/// Read-side view of the staking contract. The trait is the seam that lets
/// handler tests run without an RPC endpoint.
#[async_trait]
pub trait StakeVerifier: Send + Sync {
    async fn total_metis_staked(&self, wallet: Address) -> anyhow::Result<U256>;
}

pub struct StakeAndLockClient {
    contract: StakeAndLock<Provider<Http>>,
}

impl StakeAndLockClient {
    pub fn new(rpc_url: &str, contract_address: Address) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .with_context(|| format!("invalid RPC url {}", rpc_url))?;
        Ok(Self {
            contract: StakeAndLock::new(contract_address, Arc::new(provider)),
        })
    }
}

#[async_trait]
impl StakeVerifier for StakeAndLockClient {
    async fn total_metis_staked(&self, wallet: Address) -> anyhow::Result<U256> {
        self.contract
            .total_metis_staked(wallet)
            .call()
            .await
            .context("totalMetisStaked call failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_metis_is_1e18_wei() {
        assert_eq!(one_metis(), U256::from(1_000_000_000_000_000_000u128));
    }
}
