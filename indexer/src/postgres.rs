use chrono::prelude::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use ethers::types::{H160, U256};
use eyre::{eyre, Result};
use rust_decimal::prelude::*;
use tokio_postgres::NoTls;
use tracing::info;

use crate::utils::{get_env, one_metis, u256_to_decimal};

#[derive(Debug, Clone)]
pub struct PostgresClient {
    pool: Pool,
}

impl PostgresClient {
    pub async fn new() -> Result<Self> {
        let mut pg_config = tokio_postgres::Config::new();

        pg_config
            .user(&get_env("DB_USER"))
            .password(get_env("DB_PASSWORD"))
            .dbname(&get_env("DB_NAME"))
            .host(&get_env("DB_HOST"))
            .port(
                get_env("DB_PORT")
                    .parse::<u16>()
                    .map_err(|e| eyre!("DB_PORT is not a port number: {}", e))?,
            );

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);

        let pool = Pool::builder(mgr)
            .max_size(16)
            .build()
            .map_err(|e| eyre!("failed to build connection pool: {}", e))?;

        Ok(Self { pool })
    }

    /// Highest block for which a position was recorded on this chain, or 0
    /// when nothing has been indexed yet.
    pub async fn get_latest_block(&self, chain_id: u32) -> Result<u64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COALESCE(MAX(block_number), 0)::BIGINT FROM stake_position WHERE chain = $1",
                &[&(chain_id as i32)],
            )
            .await?;
        let latest: i64 = row.get(0);
        Ok(latest as u64)
    }

    /// Number of persisted events, stakes plus recorded unlocks; the
    /// listener watchdog samples this to detect a silently dead event
    /// stream. An unlock flips a position row, so both kinds of event move
    /// the count.
    pub async fn get_processed_event_count(&self, chain_id: u32) -> Result<u64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(PROCESSED_EVENT_COUNT_SQL, &[&(chain_id as i32)])
            .await?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    /// Records a `StakedAndLocked` event: one position row per action id
    /// plus the participant aggregate for the wallet.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_stake(
        &self,
        chain_id: u32,
        action_id: &U256,
        user: &H160,
        metis_amount: &U256,
        art_metis_amount: &U256,
        referral_id: &str,
        unlock_time: &u64,
        block_number: &u64,
        block_timestamp: &u64,
        tx_hash: &str,
    ) -> Result<()> {
        let chain_id = chain_id as i32;
        let action_id = format!("{:#x}", action_id);
        let user = format!("{:#x}", user);
        let metis_amount = u256_to_decimal(*metis_amount)?;
        let art_metis_amount = u256_to_decimal(*art_metis_amount)?;
        let unlock_time = unix_time_to_datetime(unlock_time);
        let lock_time = unix_time_to_datetime(block_timestamp);
        let block_number = Decimal::from_u64(*block_number)
            .ok_or_else(|| eyre!("block number out of range"))?;

        let client = self.pool.get().await?;

        client
            .execute(
                concat!(
                    "INSERT INTO stake_position (chain, action_id, wallet, metis_amount, art_metis_amount,",
                    " referral_id, unlock_time, lock_time, block_number, tx_hash, unlocked)",
                    " VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, false)",
                    " ON CONFLICT (chain, action_id) DO NOTHING",
                ),
                &[
                    &chain_id,
                    &action_id,
                    &user,
                    &metis_amount,
                    &art_metis_amount,
                    &referral_id,
                    &unlock_time,
                    &lock_time,
                    &block_number,
                    &tx_hash,
                ],
            )
            .await?;

        client
            .execute(
                concat!(
                    "INSERT INTO participant AS p (chain, address, total_metis_amount, total_art_metis_amount,",
                    " total_actions_count, first_block_number, last_block_number)",
                    " VALUES ($1, $2, $3, $4, 1, $5, $5) ON CONFLICT (chain, address) DO UPDATE",
                    " SET total_metis_amount = p.total_metis_amount + EXCLUDED.total_metis_amount,",
                    " total_art_metis_amount = p.total_art_metis_amount + EXCLUDED.total_art_metis_amount,",
                    " total_actions_count = p.total_actions_count + 1,",
                    " last_block_number = EXCLUDED.last_block_number",
                ),
                &[&chain_id, &user, &metis_amount, &art_metis_amount, &block_number],
            )
            .await?;

        info!(
            "Position recorded for action {} in block {} at {}",
            action_id, block_number, Utc::now()
        );

        Ok(())
    }

    /// Records an `Unlock` event against the matching position.
    pub async fn record_unlock(
        &self,
        chain_id: u32,
        action_id: &U256,
        art_metis_amount: &U256,
        block_number: &u64,
        block_timestamp: &u64,
        tx_hash: &str,
    ) -> Result<()> {
        let chain_id = chain_id as i32;
        let action_id = format!("{:#x}", action_id);
        let art_metis_amount = u256_to_decimal(*art_metis_amount)?;
        let unlocked_at = unix_time_to_datetime(block_timestamp);
        let block_number = Decimal::from_u64(*block_number)
            .ok_or_else(|| eyre!("block number out of range"))?;

        let client = self.pool.get().await?;

        client
            .execute(
                concat!(
                    "UPDATE stake_position SET unlocked = true, unlocked_art_metis_amount = $3,",
                    " unlocked_at = $4, unlocked_block_number = $5, unlocked_tx_hash = $6",
                    " WHERE chain = $1 AND action_id = $2",
                ),
                &[
                    &chain_id,
                    &action_id,
                    &art_metis_amount,
                    &unlocked_at,
                    &block_number,
                    &tx_hash,
                ],
            )
            .await?;

        info!(
            "Unlock recorded for action {} in block {}",
            action_id, block_number
        );

        Ok(())
    }

    /// Recomputes the singleton system aggregate after each event: the
    /// stake-side totals from the participant table, the count of
    /// participants whose total stake clears the 1 METIS eligibility bar,
    /// and the unlock-side totals from the unlocked position rows.
    pub async fn refresh_system_totals(&self, chain_id: u32) -> Result<()> {
        let client = self.pool.get().await?;

        client
            .execute(REFRESH_SYSTEM_TOTALS_SQL, &[&(chain_id as i32), &one_metis()])
            .await?;

        Ok(())
    }
}

const PROCESSED_EVENT_COUNT_SQL: &str =
    "SELECT COUNT(*) + COUNT(*) FILTER (WHERE unlocked) FROM stake_position WHERE chain = $1";

const REFRESH_SYSTEM_TOTALS_SQL: &str = concat!(
    "INSERT INTO system_totals AS s (chain, total_participants, total_eligible_participants,",
    " total_metis_staked_by_all, total_art_metis_locked_by_all, total_actions_count_by_all,",
    " total_unlock_actions_by_all, total_art_metis_unlocked_by_all)",
    " SELECT $1, COUNT(*), COUNT(*) FILTER (WHERE total_metis_amount >= $2),",
    " COALESCE(SUM(total_metis_amount), 0), COALESCE(SUM(total_art_metis_amount), 0),",
    " COALESCE(SUM(total_actions_count), 0),",
    " (SELECT COUNT(*) FROM stake_position WHERE chain = $1 AND unlocked),",
    " (SELECT COALESCE(SUM(unlocked_art_metis_amount), 0)",
    "   FROM stake_position WHERE chain = $1 AND unlocked)",
    " FROM participant WHERE chain = $1",
    " ON CONFLICT (chain) DO UPDATE",
    " SET total_participants = EXCLUDED.total_participants,",
    " total_eligible_participants = EXCLUDED.total_eligible_participants,",
    " total_metis_staked_by_all = EXCLUDED.total_metis_staked_by_all,",
    " total_art_metis_locked_by_all = EXCLUDED.total_art_metis_locked_by_all,",
    " total_actions_count_by_all = EXCLUDED.total_actions_count_by_all,",
    " total_unlock_actions_by_all = EXCLUDED.total_unlock_actions_by_all,",
    " total_art_metis_unlocked_by_all = EXCLUDED.total_art_metis_unlocked_by_all",
);

fn unix_time_to_datetime(unix_time: &u64) -> DateTime<Utc> {
    DateTime::from_timestamp(*unix_time as i64, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_time_conversion() {
        let dt = unix_time_to_datetime(&1_700_000_000);
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }

    #[test]
    fn out_of_range_unix_time_defaults_instead_of_panicking() {
        let dt = unix_time_to_datetime(&u64::MAX);
        assert_eq!(dt.timestamp(), 0);
    }

    // The SQL is hand-written; these guard the column lists against the
    // aggregates silently going missing on edit.

    #[test]
    fn system_totals_upsert_carries_unlock_aggregates() {
        for column in [
            "total_unlock_actions_by_all",
            "total_art_metis_unlocked_by_all",
        ] {
            // once in the insert column list, twice in the conflict update
            assert!(
                REFRESH_SYSTEM_TOTALS_SQL.matches(column).count() >= 3,
                "missing {} in system totals upsert",
                column
            );
        }
        assert!(REFRESH_SYSTEM_TOTALS_SQL.contains("FILTER (WHERE total_metis_amount >= $2)"));
    }

    #[test]
    fn event_count_includes_unlocks() {
        assert!(PROCESSED_EVENT_COUNT_SQL.contains("COUNT(*) FILTER (WHERE unlocked)"));
    }
}
