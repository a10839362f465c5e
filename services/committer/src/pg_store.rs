use anyhow::{Context, Result};
use async_trait::async_trait;
use minechain::{
    Block, CommitOutcome, EventRecord, Inclusion, InclusionProof, LedgerError, MiningEvent,
    GENESIS_PREVIOUS_HASH,
};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::backend::LedgerBackend;

/// Advisory lock key serializing commits across every committer process
const COMMIT_LOCK_KEY: i64 = 0x6d69_6e65_6368_6169;

const BLOCK_COLUMNS: &str = "block_height, block_hash, previous_hash, merkle_root, transaction_count, \
     block_reward, difficulty, miner_address, block_time_seconds, mined_at";

const EVENT_COLUMNS: &str = "id, wallet_address, challenge_id, solution_hash, points_awarded, difficulty, \
     event_ts, block_height, leaf_index, merkle_proof";

#[derive(Debug, Clone, sqlx::FromRow)]
struct BlockRow {
    block_height: i64,
    block_hash: String,
    previous_hash: String,
    merkle_root: String,
    transaction_count: i64,
    block_reward: i64,
    difficulty: i32,
    miner_address: Option<String>,
    block_time_seconds: Option<i64>,
    mined_at: i64,
}

impl From<BlockRow> for Block {
    fn from(r: BlockRow) -> Self {
        Block {
            block_height: r.block_height as u64,
            block_hash: r.block_hash,
            previous_hash: r.previous_hash,
            merkle_root: r.merkle_root,
            transaction_count: r.transaction_count as u64,
            block_reward: r.block_reward as u64,
            difficulty: r.difficulty as u32,
            miner_address: r.miner_address,
            block_time_seconds: r.block_time_seconds.map(|s| s as u64),
            mined_at: r.mined_at as u64,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct EventRow {
    id: String,
    wallet_address: String,
    challenge_id: String,
    solution_hash: String,
    points_awarded: i64,
    difficulty: i32,
    event_ts: i64,
    block_height: Option<i64>,
    leaf_index: Option<i32>,
    merkle_proof: Option<serde_json::Value>,
}

impl TryFrom<EventRow> for EventRecord {
    type Error = anyhow::Error;

    fn try_from(r: EventRow) -> Result<Self> {
        let inclusion = match (r.block_height, r.leaf_index, r.merkle_proof) {
            (Some(height), Some(index), Some(proof)) => Some(Inclusion {
                block_height: height as u64,
                proof: InclusionProof {
                    leaf_index: index as usize,
                    siblings: serde_json::from_value(proof)
                        .with_context(|| format!("bad merkle_proof on event {}", r.id))?,
                },
            }),
            _ => None,
        };

        Ok(EventRecord {
            event: MiningEvent {
                id: r.id,
                wallet_address: r.wallet_address,
                challenge_id: r.challenge_id,
                solution_hash: r.solution_hash,
                points_awarded: r.points_awarded as u64,
                difficulty: r.difficulty as u32,
                timestamp: r.event_ts as u64,
            },
            inclusion,
        })
    }
}

fn to_i64(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("{what} out of range: {value}"))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_blocks(&self, sql: String, height: Option<i64>, hash: Option<&str>) -> Result<Vec<Block>> {
        let mut q = sqlx::query_as::<_, BlockRow>(&sql);
        if let Some(h) = height {
            q = q.bind(h);
        }
        if let Some(h) = hash {
            q = q.bind(h);
        }
        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Block::from).collect())
    }

    async fn insert_block(tx: &mut Transaction<'_, Postgres>, b: &Block) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO blocks (block_height, block_hash, previous_hash, merkle_root, transaction_count,
                                block_reward, difficulty, miner_address, block_time_seconds, mined_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(to_i64(b.block_height, "block_height")?)
        .bind(&b.block_hash)
        .bind(&b.previous_hash)
        .bind(&b.merkle_root)
        .bind(to_i64(b.transaction_count, "transaction_count")?)
        .bind(to_i64(b.block_reward, "block_reward")?)
        .bind(i32::try_from(b.difficulty).context("difficulty out of range")?)
        .bind(&b.miner_address)
        .bind(b.block_time_seconds.map(|s| to_i64(s, "block_time_seconds")).transpose()?)
        .bind(to_i64(b.mined_at, "mined_at")?)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerBackend for PgBackend {
    async fn insert_event(&self, e: MiningEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mining_events (id, wallet_address, challenge_id, solution_hash, points_awarded, difficulty, event_ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&e.id)
        .bind(&e.wallet_address)
        .bind(&e.challenge_id)
        .bind(&e.solution_hash)
        .bind(to_i64(e.points_awarded, "points_awarded")?)
        .bind(i32::try_from(e.difficulty).context("difficulty out of range")?)
        .bind(to_i64(e.timestamp, "timestamp")?)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                anyhow::Error::new(LedgerError::DuplicateEvent(e.id.clone()))
            } else {
                err.into()
            }
        })?;
        Ok(())
    }

    async fn pending_events(&self, limit: usize) -> Result<Vec<MiningEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM mining_events WHERE block_height IS NULL ORDER BY seq ASC LIMIT $1"
        );
        let rows: Vec<EventRow> = sqlx::query_as(&sql)
            .bind(i64::try_from(limit).context("limit out of range")?)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| EventRecord::try_from(r).map(|rec| rec.event))
            .collect()
    }

    async fn mempool_size(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mining_events WHERE block_height IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn latest_block(&self) -> Result<Option<Block>> {
        let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks ORDER BY block_height DESC LIMIT 1");
        Ok(self.fetch_blocks(sql, None, None).await?.pop())
    }

    async fn block_by_height(&self, height: u64) -> Result<Option<Block>> {
        let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE block_height = $1");
        let height = to_i64(height, "height")?;
        Ok(self.fetch_blocks(sql, Some(height), None).await?.pop())
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Option<Block>> {
        let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE block_hash = $1");
        Ok(self.fetch_blocks(sql, None, Some(hash)).await?.pop())
    }

    async fn list_blocks(&self, limit: usize, offset: usize) -> Result<Vec<Block>> {
        let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks ORDER BY block_height DESC LIMIT $1 OFFSET $2");
        let rows: Vec<BlockRow> = sqlx::query_as(&sql)
            .bind(i64::try_from(limit).context("limit out of range")?)
            .bind(i64::try_from(offset).context("offset out of range")?)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Block::from).collect())
    }

    async fn chain(&self) -> Result<Vec<Block>> {
        let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks ORDER BY block_height ASC");
        self.fetch_blocks(sql, None, None).await
    }

    async fn event(&self, id: &str) -> Result<Option<EventRecord>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM mining_events WHERE id = $1");
        let row: Option<EventRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(EventRecord::try_from).transpose()
    }

    async fn events_in_block(&self, height: u64) -> Result<Vec<EventRecord>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM mining_events WHERE block_height = $1 ORDER BY leaf_index ASC");
        let rows: Vec<EventRow> = sqlx::query_as(&sql)
            .bind(to_i64(height, "height")?)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(EventRecord::try_from).collect()
    }

    async fn apply_commit(&self, outcome: &CommitOutcome) -> Result<()> {
        let block = &outcome.block;
        let mut tx = self.pool.begin().await?;

        // one committer at a time, across processes
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(COMMIT_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let tip: Option<(i64, String)> =
            sqlx::query_as("SELECT block_height, block_hash FROM blocks ORDER BY block_height DESC LIMIT 1")
                .fetch_optional(&mut *tx)
                .await?;

        let expected_height = tip.as_ref().map_or(0, |(h, _)| *h as u64 + 1);
        let expected_prev = tip.as_ref().map_or(GENESIS_PREVIOUS_HASH, |(_, hash)| hash.as_str());
        let conflict = || {
            anyhow::Error::new(LedgerError::ChainConflict {
                expected_height,
                attempted_height: block.block_height,
            })
        };

        if block.block_height != expected_height || block.previous_hash != expected_prev {
            return Err(conflict());
        }

        Self::insert_block(&mut tx, block).await.map_err(|e| {
            if e.downcast_ref::<sqlx::Error>().is_some_and(is_unique_violation) {
                conflict()
            } else {
                e
            }
        })?;

        let commitment_id = Uuid::new_v4();
        let c = &outcome.commitment;
        sqlx::query(
            r#"
            INSERT INTO merkle_commitments (id, block_height, merkle_root, transaction_signature, event_count, events_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(commitment_id)
        .bind(to_i64(c.block_height, "block_height")?)
        .bind(&c.merkle_root)
        .bind(&c.transaction_signature)
        .bind(to_i64(c.event_count, "event_count")?)
        .bind(&c.events_hash)
        .execute(&mut *tx)
        .await?;

        for proven in &outcome.events {
            let proof = serde_json::to_value(&proven.proof.siblings)?;
            let updated = sqlx::query(
                r#"
                UPDATE mining_events
                SET block_height = $2, merkle_commitment_id = $3, leaf_index = $4, merkle_proof = $5
                WHERE id = $1 AND block_height IS NULL
                "#,
            )
            .bind(&proven.event.id)
            .bind(to_i64(block.block_height, "block_height")?)
            .bind(commitment_id)
            .bind(i32::try_from(proven.proof.leaf_index).context("leaf index out of range")?)
            .bind(proof)
            .execute(&mut *tx)
            .await?;

            // already included by someone else; dropping tx rolls everything back
            if updated.rows_affected() != 1 {
                return Err(conflict());
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
