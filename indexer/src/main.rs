mod postgres;
mod staking_indexer;
mod utils;

use dotenv::dotenv;
use ethers::core::types::Address;
use eyre::{Result, WrapErr};
use postgres::PostgresClient;
use staking_indexer::StakeAndLockIndexer;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use utils::get_env;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let rpc_url = get_env("METIS_RPC_WS");
    let start_block: u64 = get_env("CONTRACT_START_BLOCK")
        .parse()
        .wrap_err("CONTRACT_START_BLOCK is not a block number")?;
    let contract_address: Address = get_env("CONTRACT_ADDRESS")
        .parse()
        .wrap_err("CONTRACT_ADDRESS is not a valid EVM address")?;

    loop {
        let postgres_client = PostgresClient::new().await?;

        let indexer =
            StakeAndLockIndexer::new(postgres_client, &rpc_url, start_block, &contract_address)
                .await?;

        match indexer.listen_with_timeout_reset().await {
            Ok(_) => {
                warn!("indexer ended without error");
            }
            Err(err) => {
                warn!("indexer ended with error, {}", err);
            }
        }
        // Loop facilitates starting over and recreating all connections if
        // anything fails (aka if the above call ever returns)
    }
}
