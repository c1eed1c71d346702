use crate::{postgres::PostgresClient, utils::create_rpc_connection};
use ethers::{
    contract::{abigen, LogMeta},
    core::types::Address,
    providers::{Middleware, Provider, StreamExt, Ws},
};
use eyre::{eyre, Result};
use futures::try_join;
use std::{
    cmp::{max, min},
    sync::Arc,
};
use tracing::{debug, error, info, warn};

abigen!(StakeAndLock, "./src/StakeAndLock.json",);

pub struct StakeAndLockIndexer<'a> {
    postgres_client: PostgresClient,
    rpc_url: &'a String,
    chain_id: u32,
    start_block: u64,
    contract_address: &'a Address,
}

async fn get_chain_id(rpc_url: &String) -> Result<u32> {
    let client = create_rpc_connection(rpc_url).await;
    let chain_id = client.get_chainid().await?;
    Ok(chain_id.as_u32())
}

/// End block of the next past-events chunk, or `None` once paging has
/// caught up to the chain head. Safe against a head at block 0 or 1.
fn next_past_chunk_end(query_start_block: u64, current_block: u64) -> Option<u64> {
    let last_past_block = current_block.saturating_sub(1);
    if query_start_block >= last_past_block {
        return None;
    }
    Some(min(query_start_block + 999, last_past_block))
}

impl<'a> StakeAndLockIndexer<'a> {
    pub async fn new(
        postgres_client: PostgresClient,
        rpc_url: &'a String,
        start_block: u64,
        contract_address: &'a Address,
    ) -> Result<Self> {
        let chain_id = get_chain_id(rpc_url).await?;
        Ok(Self {
            postgres_client,
            rpc_url,
            chain_id,
            start_block,
            contract_address,
        })
    }

    async fn get_query_start_block(&self) -> Result<u64> {
        let latest_logged_block = self.postgres_client.get_latest_block(self.chain_id).await?;

        if latest_logged_block > 0 {
            Ok(latest_logged_block + 1)
        } else {
            Ok(self.start_block)
        }
    }

    pub async fn listen_with_timeout_reset(&self) -> Result<()> {
        loop {
            let query_start_block = self.get_query_start_block().await?;

            info!(
                "Starting indexer for chain {} at block {}",
                self.chain_id, query_start_block
            );

            match try_join!(
                self.throw_when_no_events_logged(),
                self.listen_for_stake_events(&query_start_block),
            ) {
                Ok(_) => {
                    warn!(
                        "indexer timeout join ended without error for chain {}",
                        self.chain_id
                    );
                }
                Err(err) => {
                    if err
                        .to_string()
                        .contains("No events logged in the last 15 minutes")
                    {
                        debug!(
                            "resetting indexer due to no events logged in the last 15 minutes for chain {}",
                            self.chain_id
                        );
                    } else {
                        warn!(
                            "indexer timeout join ended with error for chain {}, {:?}",
                            self.chain_id, err
                        );
                    }
                }
            }
        }
    }

    async fn throw_when_no_events_logged(&self) -> Result<()> {
        let mut timer_begin_event_count = self
            .postgres_client
            .get_processed_event_count(self.chain_id)
            .await?;
        loop {
            // sleep for 15 minutes
            tokio::time::sleep(tokio::time::Duration::from_secs(900)).await;

            // stakes and unlocks both count; a period with only unlocks is
            // a live stream, not a stalled one
            let event_count = self
                .postgres_client
                .get_processed_event_count(self.chain_id)
                .await?;

            if event_count <= timer_begin_event_count {
                return Err(eyre!(
                    "No events logged in the last 15 minutes for chain {}, event count is {}",
                    self.chain_id,
                    event_count
                ));
            }

            timer_begin_event_count = event_count;
        }
    }

    async fn get_current_block(&self) -> Result<u64> {
        // Recreating the client here because a failure (e.g. against a local
        // hardhat node) ruins it and it must be rebuilt
        let client = create_rpc_connection(self.rpc_url).await;
        let block_number = client.get_block_number().await?;
        Ok(block_number.as_u64())
    }

    async fn listen_for_stake_events(&self, initial_query_start_block: &u64) -> Result<()> {
        let mut current_block: u64 = 2;
        if let Ok(block_number) = self.get_current_block().await {
            current_block = block_number;
        } else {
            warn!(
                "Failed to fetch current block number for chain {}",
                self.chain_id
            );
        }

        let client = Arc::new(create_rpc_connection(self.rpc_url).await);

        let stake_and_lock_contract = StakeAndLock::new(*self.contract_address, client.clone());

        let mut query_start_block: u64 = *initial_query_start_block;

        // eth_getLogs allows up to a 2K block range; staying at 1K because of
        // occasional timeout issues
        while let Some(query_end_block) = next_past_chunk_end(query_start_block, current_block) {
            debug!(
                "Querying past events for chain {} from block {} to block {}",
                self.chain_id, query_start_block, query_end_block
            );
            let previous_events_query = stake_and_lock_contract
                .events()
                .from_block(query_start_block)
                .to_block(query_end_block)
                .query_with_meta()
                .await;

            match previous_events_query {
                Ok(previous_events) => {
                    for (event, meta) in previous_events.iter() {
                        self.process_staking_event(event, meta, &client).await?;
                    }
                    query_start_block = query_end_block + 1;
                }
                Err(err) => {
                    return Err(eyre!(
                        "Failed to query events for chain {}: {}, {}, {:?}",
                        self.chain_id,
                        query_start_block,
                        query_end_block,
                        err
                    ));
                }
            }
        }

        debug!("Finished querying past events for chain {}", self.chain_id);

        let from_block = max(query_start_block, current_block);

        info!(
            "Listening for future events for chain {} from block {}",
            self.chain_id, from_block
        );

        let future_events = stake_and_lock_contract.events().from_block(from_block);

        let mut stream = future_events.stream().await?.with_meta();

        while let Some(event_with_meta) = stream.next().await {
            let (event, meta) = match event_with_meta {
                Err(err) => {
                    error!(
                        "Failed to fetch StakeAndLock events for chain {}: {:?}",
                        self.chain_id, err
                    );
                    break;
                }
                Ok(event_with_meta) => event_with_meta,
            };

            self.process_staking_event(&event, &meta, &client).await?;
        }

        Ok(())
    }

    async fn process_staking_event(
        &self,
        event: &StakeAndLockEvents,
        meta: &LogMeta,
        client: &Arc<Provider<Ws>>,
    ) -> Result<()> {
        let block_number = meta.block_number.as_u64();
        let tx_hash = format!("{:?}", meta.transaction_hash);
        let block_timestamp = self.get_block_timestamp(meta, client).await?;

        match event {
            StakeAndLockEvents::StakedAndLockedFilter(event) => {
                self.postgres_client
                    .add_stake(
                        self.chain_id,
                        &event.action_id,
                        &event.user,
                        &event.metis_amount,
                        &event.art_metis_amount,
                        &event.referral_id,
                        &event.unlock_time.as_u64(),
                        &block_number,
                        &block_timestamp,
                        &tx_hash,
                    )
                    .await?;
            }
            StakeAndLockEvents::UnlockFilter(event) => {
                self.postgres_client
                    .record_unlock(
                        self.chain_id,
                        &event.action_id,
                        &event.art_metis_amount,
                        &block_number,
                        &block_timestamp,
                        &tx_hash,
                    )
                    .await?;
            }
        }

        self.postgres_client
            .refresh_system_totals(self.chain_id)
            .await
    }

    async fn get_block_timestamp(&self, meta: &LogMeta, client: &Arc<Provider<Ws>>) -> Result<u64> {
        let block = client
            .get_block(meta.block_number)
            .await?
            .ok_or_else(|| eyre!("block {} not found", meta.block_number))?;
        Ok(block.timestamp.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn past_chunks_page_in_1000_block_steps() {
        assert_eq!(next_past_chunk_end(100, 5_000), Some(1_099));
        assert_eq!(next_past_chunk_end(1_100, 5_000), Some(2_099));
        // final partial chunk stops just below the head
        assert_eq!(next_past_chunk_end(4_100, 5_000), Some(4_999));
        assert_eq!(next_past_chunk_end(4_999, 5_000), None);
    }

    #[test]
    fn paging_at_the_chain_head_yields_nothing() {
        assert_eq!(next_past_chunk_end(5_000, 5_000), None);
        assert_eq!(next_past_chunk_end(6_000, 5_000), None);
    }

    #[test]
    fn genesis_head_does_not_underflow() {
        assert_eq!(next_past_chunk_end(0, 0), None);
        assert_eq!(next_past_chunk_end(0, 1), None);
        assert_eq!(next_past_chunk_end(0, 2), Some(1));
    }
}
