use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Row, Transaction};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{Customer, Play, PrizeAssignment, PrizeType, Promotion, PromotionStatus, Token, TokenStatus};

/// Outcome of inserting a `PrizeAssignment`: the backing store reports a
/// `prizeCode` uniqueness collision as a typed result, not an error — the
/// play transaction decides whether to retry (spec §4.7.e).
pub enum AssignmentInsert {
    Inserted(PrizeAssignment),
    CodeConflict,
}

/// Counts needed to drive the outcome selector, loaded fresh inside the
/// transactional scope — spec §5: "No in-process cache of stock or
/// counters is permitted."
pub struct PromotionCounts {
    pub total_tokens: i64,
    pub used_tokens: i64,
    pub prizes_assigned_total: i64,
}

/// The transactional scope obtained from `PromotionStore::begin`. Every
/// method here runs inside one serializable transaction; no suspension may
/// occur between `conditional_decrement_stock` and the subsequent
/// `insert_play`/`insert_prize_assignment` calls (spec §5).
#[async_trait]
pub trait PromotionTx: Send {
    async fn counts(&mut self, promotion_id: Uuid) -> anyhow::Result<PromotionCounts>;
    async fn load_prize_types(&mut self, promotion_id: Uuid) -> anyhow::Result<Vec<PrizeType>>;
    async fn conditional_decrement_stock(&mut self, prize_type_id: Uuid) -> anyhow::Result<u64>;
    async fn insert_play(
        &mut self,
        promotion_id: Uuid,
        token_id: Uuid,
        customer_id: Uuid,
        is_winner: bool,
    ) -> anyhow::Result<Play>;
    async fn insert_prize_assignment(
        &mut self,
        promotion_id: Uuid,
        prize_type_id: Uuid,
        customer_id: Uuid,
        token_id: Uuid,
        play_id: Uuid,
        prize_code: &str,
    ) -> anyhow::Result<AssignmentInsert>;
    /// Conditional `available -> used` claim, gated on `status = 'available'`
    /// the same way `conditional_decrement_stock` gates on `remaining_stock
    /// > 0`. The pre-transaction check at step 2 is only an optimistic fast
    /// path: both callers racing the same token can pass it before either
    /// has begun a transaction, so this conditional update — called as the
    /// *first* operation inside the transactional scope, ahead of the
    /// literal step-5.g position in §4.7 — is what actually realizes the
    /// per-token linearizability guarantee of §5. Returns `false` if another
    /// transaction already claimed the token; the caller must then abort
    /// without any further writes.
    async fn mark_token_used(&mut self, token_id: Uuid, used_at: DateTime<Utc>) -> anyhow::Result<bool>;
    async fn increment_customer_counters(
        &mut self,
        customer_id: Uuid,
        won: bool,
        last_win_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()>;
    /// Flips an uncommitted winning Play to a loss. Used only when the
    /// bounded prize-code retry in §4.7.e is exhausted — the Play row is
    /// still uncommitted at this point, so rewriting it before commit does
    /// not violate the "Play is an immutable event" invariant, which
    /// applies to committed state.
    async fn mark_play_as_loss(&mut self, play_id: Uuid) -> anyhow::Result<()>;
    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
}

/// The persistence contract the core requires from its collaborator (spec
/// §6). `load_token_by_code`/`load_customer` run outside the transaction —
/// they back the pre-transaction validation steps of §4.7 (1-4).
#[async_trait]
pub trait PromotionStore: Send + Sync {
    async fn load_token_by_code(&self, code: &str) -> anyhow::Result<Option<Token>>;
    async fn load_customer(&self, id: Uuid) -> anyhow::Result<Option<Customer>>;
    /// Not part of the persistence contract's named operation list (spec
    /// §6), but required to supply the outcome selector's optional
    /// `startTime`/`endTime` window (§4.6) — the contract list is the
    /// abstract shape the core needs, and the Promotion entity already
    /// appears in the data model (§3).
    async fn load_promotion(&self, id: Uuid) -> anyhow::Result<Option<Promotion>>;
    async fn begin(&self) -> anyhow::Result<Box<dyn PromotionTx + '_>>;
}

/// Real implementation: `sqlx` against Postgres, grounded directly on
/// `predictiq-api::db::Database` (same `Clone` + `PgPool` shape, raw
/// `sqlx::query(...).bind(...).try_get(...)`, no compile-time checked
/// `query!`).
#[derive(Clone)]
pub struct PgPromotionStore {
    pool: PgPool,
}

impl PgPromotionStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(25)
            .min_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .context("failed to connect to postgres")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PromotionStore for PgPromotionStore {
    async fn load_token_by_code(&self, code: &str) -> anyhow::Result<Option<Token>> {
        let row = sqlx::query(
            "SELECT id, promotion_id, code, status, used_at FROM tokens WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let status_raw: String = row.try_get("status")?;
        Ok(Some(Token {
            id: row.try_get("id")?,
            promotion_id: row.try_get("promotion_id")?,
            code: row.try_get("code")?,
            status: parse_token_status(&status_raw),
            used_at: row.try_get("used_at")?,
        }))
    }

    async fn load_customer(&self, id: Uuid) -> anyhow::Result<Option<Customer>> {
        let row = sqlx::query(
            "SELECT id, promotion_id, phone_number, first_name, last_name, detected_gender, \
                    total_plays, total_wins, last_win_at \
             FROM customers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let gender_raw: String = row.try_get("detected_gender")?;
        Ok(Some(Customer {
            id: row.try_get("id")?,
            promotion_id: row.try_get("promotion_id")?,
            phone_number: row.try_get("phone_number")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            detected_gender: parse_gender(&gender_raw),
            total_plays: row.try_get("total_plays")?,
            total_wins: row.try_get("total_wins")?,
            last_win_at: row.try_get("last_win_at")?,
        }))
    }

    async fn load_promotion(&self, id: Uuid) -> anyhow::Result<Option<Promotion>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, start_time, end_time, status FROM promotions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let status_raw: String = row.try_get("status")?;
        Ok(Some(Promotion {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            status: parse_promotion_status(&status_raw),
        }))
    }

    async fn begin(&self) -> anyhow::Result<Box<dyn PromotionTx + '_>> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .context("failed to set isolation level")?;
        Ok(Box::new(PgPromotionTx { tx: Some(tx) }))
    }
}

struct PgPromotionTx<'a> {
    tx: Option<Transaction<'a, Postgres>>,
}

impl<'a> PgPromotionTx<'a> {
    fn conn(&mut self) -> &mut Transaction<'a, Postgres> {
        self.tx.as_mut().expect("transaction already committed")
    }
}

#[async_trait]
impl<'a> PromotionTx for PgPromotionTx<'a> {
    async fn counts(&mut self, promotion_id: Uuid) -> anyhow::Result<PromotionCounts> {
        let row = sqlx::query(
            "SELECT COUNT(*)::BIGINT AS total, \
                    COUNT(*) FILTER (WHERE status = 'used')::BIGINT AS used \
             FROM tokens WHERE promotion_id = $1",
        )
        .bind(promotion_id)
        .fetch_one(&mut *self.conn())
        .await?;

        let assigned_row = sqlx::query(
            "SELECT COUNT(*)::BIGINT AS count FROM prize_assignments WHERE promotion_id = $1",
        )
        .bind(promotion_id)
        .fetch_one(&mut *self.conn())
        .await?;

        Ok(PromotionCounts {
            total_tokens: row.try_get("total")?,
            used_tokens: row.try_get("used")?,
            prizes_assigned_total: assigned_row.try_get("count")?,
        })
    }

    async fn load_prize_types(&mut self, promotion_id: Uuid) -> anyhow::Result<Vec<PrizeType>> {
        let rows = sqlx::query(
            "SELECT id, promotion_id, name, initial_stock, remaining_stock, gender_restriction \
             FROM prize_types WHERE promotion_id = $1 ORDER BY id",
        )
        .bind(promotion_id)
        .fetch_all(&mut *self.conn())
        .await?;

        let mut prize_types = Vec::with_capacity(rows.len());
        for row in rows {
            let restriction_raw: String = row.try_get("gender_restriction")?;
            prize_types.push(PrizeType {
                id: row.try_get("id")?,
                promotion_id: row.try_get("promotion_id")?,
                name: row.try_get("name")?,
                initial_stock: row.try_get("initial_stock")?,
                remaining_stock: row.try_get("remaining_stock")?,
                gender_restriction: parse_gender_restriction(&restriction_raw),
            });
        }
        Ok(prize_types)
    }

    async fn conditional_decrement_stock(&mut self, prize_type_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE prize_types SET remaining_stock = remaining_stock - 1 \
             WHERE id = $1 AND remaining_stock > 0",
        )
        .bind(prize_type_id)
        .execute(&mut *self.conn())
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_play(
        &mut self,
        promotion_id: Uuid,
        token_id: Uuid,
        customer_id: Uuid,
        is_winner: bool,
    ) -> anyhow::Result<Play> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO plays (id, promotion_id, token_id, customer_id, is_winner, created_at) \
             VALUES ($1, $2, $3, $4, $5, NOW()) RETURNING created_at",
        )
        .bind(id)
        .bind(promotion_id)
        .bind(token_id)
        .bind(customer_id)
        .bind(is_winner)
        .fetch_one(&mut *self.conn())
        .await?;

        Ok(Play {
            id,
            promotion_id,
            token_id,
            customer_id,
            is_winner,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn insert_prize_assignment(
        &mut self,
        promotion_id: Uuid,
        prize_type_id: Uuid,
        customer_id: Uuid,
        token_id: Uuid,
        play_id: Uuid,
        prize_code: &str,
    ) -> anyhow::Result<AssignmentInsert> {
        let id = Uuid::new_v4();
        let result = sqlx::query(
            "INSERT INTO prize_assignments \
                (id, promotion_id, prize_type_id, customer_id, token_id, play_id, prize_code) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(promotion_id)
        .bind(prize_type_id)
        .bind(customer_id)
        .bind(token_id)
        .bind(play_id)
        .bind(prize_code)
        .execute(&mut *self.conn())
        .await;

        match result {
            Ok(_) => Ok(AssignmentInsert::Inserted(PrizeAssignment {
                id,
                promotion_id,
                prize_type_id,
                customer_id,
                token_id,
                play_id,
                prize_code: prize_code.to_string(),
                redeemed_at: None,
            })),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                Ok(AssignmentInsert::CodeConflict)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn mark_token_used(&mut self, token_id: Uuid, used_at: DateTime<Utc>) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE tokens SET status = 'used', used_at = $2 \
             WHERE id = $1 AND status = 'available'",
        )
        .bind(token_id)
        .bind(used_at)
        .execute(&mut *self.conn())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn increment_customer_counters(
        &mut self,
        customer_id: Uuid,
        won: bool,
        last_win_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE customers SET total_plays = total_plays + 1, \
                    total_wins = total_wins + $2, \
                    last_win_at = COALESCE($3, last_win_at) \
             WHERE id = $1",
        )
        .bind(customer_id)
        .bind(if won { 1_i32 } else { 0_i32 })
        .bind(last_win_at)
        .execute(&mut *self.conn())
        .await?;
        Ok(())
    }

    async fn mark_play_as_loss(&mut self, play_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE plays SET is_winner = false WHERE id = $1")
            .bind(play_id)
            .execute(&mut *self.conn())
            .await?;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> anyhow::Result<()> {
        let tx = self.tx.take().expect("transaction already committed");
        tx.commit().await.context("failed to commit transaction")?;
        Ok(())
    }
}

fn parse_token_status(raw: &str) -> TokenStatus {
    match raw {
        "used" => TokenStatus::Used,
        _ => TokenStatus::Available,
    }
}

fn parse_promotion_status(raw: &str) -> PromotionStatus {
    match raw {
        "active" => PromotionStatus::Active,
        "paused" => PromotionStatus::Paused,
        "ended" => PromotionStatus::Ended,
        _ => PromotionStatus::Draft,
    }
}

fn parse_gender(raw: &str) -> crate::models::Gender {
    match raw {
        "f" => crate::models::Gender::F,
        "m" => crate::models::Gender::M,
        _ => crate::models::Gender::Unknown,
    }
}

fn parse_gender_restriction(raw: &str) -> crate::models::GenderRestriction {
    match raw {
        "f" => crate::models::GenderRestriction::F,
        "m" => crate::models::GenderRestriction::M,
        _ => crate::models::GenderRestriction::None,
    }
}

/// In-process store used by the concurrency property tests (spec §8) so
/// 1,000-way single-token races and single-unit prize races run
/// deterministically without a live Postgres instance. The teacher repo has
/// no analogue for this — it is a necessary addition, not a generalization
/// of existing teacher code (see DESIGN.md).
#[derive(Default)]
struct MockState {
    tokens: HashMap<Uuid, Token>,
    tokens_by_code: HashMap<String, Uuid>,
    customers: HashMap<Uuid, Customer>,
    prize_types: HashMap<Uuid, PrizeType>,
    promotions: HashMap<Uuid, Promotion>,
    plays: Vec<Play>,
    assignments: Vec<PrizeAssignment>,
    prize_codes: std::collections::HashSet<String>,
}

#[derive(Clone)]
pub struct MockPromotionStore {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockPromotionStore {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }
}

impl MockPromotionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_token(&self, token: Token) {
        let mut state = self.state.lock().await;
        state.tokens_by_code.insert(token.code.clone(), token.id);
        state.tokens.insert(token.id, token);
    }

    pub async fn seed_customer(&self, customer: Customer) {
        let mut state = self.state.lock().await;
        state.customers.insert(customer.id, customer);
    }

    pub async fn seed_prize_type(&self, prize_type: PrizeType) {
        let mut state = self.state.lock().await;
        state.prize_types.insert(prize_type.id, prize_type);
    }

    pub async fn seed_promotion(&self, promotion: Promotion) {
        let mut state = self.state.lock().await;
        state.promotions.insert(promotion.id, promotion);
    }

    pub async fn prize_type(&self, id: Uuid) -> Option<PrizeType> {
        self.state.lock().await.prize_types.get(&id).cloned()
    }

    pub async fn customer(&self, id: Uuid) -> Option<Customer> {
        self.state.lock().await.customers.get(&id).cloned()
    }

    pub async fn token(&self, id: Uuid) -> Option<Token> {
        self.state.lock().await.tokens.get(&id).cloned()
    }

    pub async fn assignment_count(&self) -> usize {
        self.state.lock().await.assignments.len()
    }

    pub async fn play_count(&self) -> usize {
        self.state.lock().await.plays.len()
    }
}

#[async_trait]
impl PromotionStore for MockPromotionStore {
    async fn load_token_by_code(&self, code: &str) -> anyhow::Result<Option<Token>> {
        let state = self.state.lock().await;
        Ok(state
            .tokens_by_code
            .get(code)
            .and_then(|id| state.tokens.get(id))
            .cloned())
    }

    async fn load_customer(&self, id: Uuid) -> anyhow::Result<Option<Customer>> {
        Ok(self.state.lock().await.customers.get(&id).cloned())
    }

    async fn load_promotion(&self, id: Uuid) -> anyhow::Result<Option<Promotion>> {
        Ok(self.state.lock().await.promotions.get(&id).cloned())
    }

    async fn begin(&self) -> anyhow::Result<Box<dyn PromotionTx + '_>> {
        // Holding the single mutex for the whole scope gives this mock the
        // same "no suspension, fully serialized" guarantee a real
        // SERIALIZABLE transaction gives the Postgres implementation.
        // Mutual exclusion alone isn't atomicity, though: every mutating
        // call below also appends an `UndoOp`, and `Drop` replays that log
        // in reverse if the transaction is abandoned (e.g. a caller
        // deadline elapsing, spec §5) without reaching `commit()`.
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(MockPromotionTx {
            guard: Some(guard),
            committed: false,
            undo: Vec::new(),
        }))
    }
}

/// Reverses exactly one prior mutation against `MockState`. Pushed by every
/// mutating `MockPromotionTx` method; replayed, most-recent-first, by
/// `Drop` when a transaction is abandoned before `commit()`.
enum UndoOp {
    TokenClaim {
        token_id: Uuid,
        prior_status: TokenStatus,
        prior_used_at: Option<DateTime<Utc>>,
    },
    StockDecrement {
        prize_type_id: Uuid,
        prior_remaining: i64,
    },
    PlayInserted {
        play_id: Uuid,
    },
    PlayWinnerFlag {
        play_id: Uuid,
        prior_is_winner: bool,
    },
    AssignmentInserted {
        assignment_id: Uuid,
        prize_code: String,
    },
    CustomerCounters {
        customer_id: Uuid,
        prior_total_plays: i64,
        prior_total_wins: i64,
        prior_last_win_at: Option<DateTime<Utc>>,
    },
}

impl UndoOp {
    fn apply(self, state: &mut MockState) {
        match self {
            UndoOp::TokenClaim {
                token_id,
                prior_status,
                prior_used_at,
            } => {
                if let Some(token) = state.tokens.get_mut(&token_id) {
                    token.status = prior_status;
                    token.used_at = prior_used_at;
                }
            }
            UndoOp::StockDecrement {
                prize_type_id,
                prior_remaining,
            } => {
                if let Some(prize_type) = state.prize_types.get_mut(&prize_type_id) {
                    prize_type.remaining_stock = prior_remaining;
                }
            }
            UndoOp::PlayInserted { play_id } => {
                state.plays.retain(|p| p.id != play_id);
            }
            UndoOp::PlayWinnerFlag {
                play_id,
                prior_is_winner,
            } => {
                if let Some(play) = state.plays.iter_mut().find(|p| p.id == play_id) {
                    play.is_winner = prior_is_winner;
                }
            }
            UndoOp::AssignmentInserted {
                assignment_id,
                prize_code,
            } => {
                state.assignments.retain(|a| a.id != assignment_id);
                state.prize_codes.remove(&prize_code);
            }
            UndoOp::CustomerCounters {
                customer_id,
                prior_total_plays,
                prior_total_wins,
                prior_last_win_at,
            } => {
                if let Some(customer) = state.customers.get_mut(&customer_id) {
                    customer.total_plays = prior_total_plays;
                    customer.total_wins = prior_total_wins;
                    customer.last_win_at = prior_last_win_at;
                }
            }
        }
    }
}

struct MockPromotionTx {
    guard: Option<tokio::sync::OwnedMutexGuard<MockState>>,
    committed: bool,
    undo: Vec<UndoOp>,
}

impl MockPromotionTx {
    fn state(&mut self) -> &mut MockState {
        self.guard.as_mut().expect("transaction already committed")
    }
}

/// Rolls back an abandoned transaction. `commit()` sets `committed` and
/// drains `guard`/`undo` first, so this is a no-op on the success path —
/// it only fires when `MockPromotionTx` is dropped without ever reaching
/// `commit()` (store error propagated via `?`, or the caller's deadline in
/// `play::play` elapsing and `tokio::time::timeout` dropping the in-flight
/// transaction).
impl Drop for MockPromotionTx {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let Some(state) = self.guard.as_mut() else {
            return;
        };
        while let Some(op) = self.undo.pop() {
            op.apply(state);
        }
    }
}

#[async_trait]
impl PromotionTx for MockPromotionTx {
    async fn counts(&mut self, promotion_id: Uuid) -> anyhow::Result<PromotionCounts> {
        let state = self.state();
        let total_tokens = state
            .tokens
            .values()
            .filter(|t| t.promotion_id == promotion_id)
            .count() as i64;
        let used_tokens = state
            .tokens
            .values()
            .filter(|t| t.promotion_id == promotion_id && t.status == TokenStatus::Used)
            .count() as i64;
        let prizes_assigned_total = state
            .assignments
            .iter()
            .filter(|a| a.promotion_id == promotion_id)
            .count() as i64;
        Ok(PromotionCounts {
            total_tokens,
            used_tokens,
            prizes_assigned_total,
        })
    }

    async fn load_prize_types(&mut self, promotion_id: Uuid) -> anyhow::Result<Vec<PrizeType>> {
        let mut types: Vec<PrizeType> = self
            .state()
            .prize_types
            .values()
            .filter(|p| p.promotion_id == promotion_id)
            .cloned()
            .collect();
        types.sort_by_key(|p| p.id);
        Ok(types)
    }

    async fn conditional_decrement_stock(&mut self, prize_type_id: Uuid) -> anyhow::Result<u64> {
        let prior = {
            let state = self.guard.as_mut().expect("transaction already committed");
            match state.prize_types.get_mut(&prize_type_id) {
                Some(prize_type) if prize_type.remaining_stock > 0 => {
                    let prior = prize_type.remaining_stock;
                    prize_type.remaining_stock -= 1;
                    Some(prior)
                }
                _ => None,
            }
        };
        match prior {
            Some(prior_remaining) => {
                self.undo.push(UndoOp::StockDecrement {
                    prize_type_id,
                    prior_remaining,
                });
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn insert_play(
        &mut self,
        promotion_id: Uuid,
        token_id: Uuid,
        customer_id: Uuid,
        is_winner: bool,
    ) -> anyhow::Result<Play> {
        let play = Play {
            id: Uuid::new_v4(),
            promotion_id,
            token_id,
            customer_id,
            is_winner,
            created_at: Utc::now(),
        };
        self.guard
            .as_mut()
            .expect("transaction already committed")
            .plays
            .push(play.clone());
        self.undo.push(UndoOp::PlayInserted { play_id: play.id });
        Ok(play)
    }

    async fn insert_prize_assignment(
        &mut self,
        promotion_id: Uuid,
        prize_type_id: Uuid,
        customer_id: Uuid,
        token_id: Uuid,
        play_id: Uuid,
        prize_code: &str,
    ) -> anyhow::Result<AssignmentInsert> {
        let state = self.guard.as_mut().expect("transaction already committed");
        if !state.prize_codes.insert(prize_code.to_string()) {
            return Ok(AssignmentInsert::CodeConflict);
        }
        let assignment = PrizeAssignment {
            id: Uuid::new_v4(),
            promotion_id,
            prize_type_id,
            customer_id,
            token_id,
            play_id,
            prize_code: prize_code.to_string(),
            redeemed_at: None,
        };
        state.assignments.push(assignment.clone());
        self.undo.push(UndoOp::AssignmentInserted {
            assignment_id: assignment.id,
            prize_code: assignment.prize_code.clone(),
        });
        Ok(AssignmentInsert::Inserted(assignment))
    }

    async fn mark_token_used(&mut self, token_id: Uuid, used_at: DateTime<Utc>) -> anyhow::Result<bool> {
        let claimed = {
            let state = self.guard.as_mut().expect("transaction already committed");
            let Some(token) = state.tokens.get_mut(&token_id) else {
                return Ok(false);
            };
            if token.status != TokenStatus::Available {
                return Ok(false);
            }
            let prior_status = token.status;
            let prior_used_at = token.used_at;
            token.status = TokenStatus::Used;
            token.used_at = Some(used_at);
            (prior_status, prior_used_at)
        };
        self.undo.push(UndoOp::TokenClaim {
            token_id,
            prior_status: claimed.0,
            prior_used_at: claimed.1,
        });
        Ok(true)
    }

    async fn increment_customer_counters(
        &mut self,
        customer_id: Uuid,
        won: bool,
        last_win_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        let prior = {
            let state = self.guard.as_mut().expect("transaction already committed");
            state.customers.get_mut(&customer_id).map(|customer| {
                let prior = (customer.total_plays, customer.total_wins, customer.last_win_at);
                customer.total_plays += 1;
                if won {
                    customer.total_wins += 1;
                    customer.last_win_at = last_win_at;
                }
                prior
            })
        };
        if let Some((prior_total_plays, prior_total_wins, prior_last_win_at)) = prior {
            self.undo.push(UndoOp::CustomerCounters {
                customer_id,
                prior_total_plays,
                prior_total_wins,
                prior_last_win_at,
            });
        }
        Ok(())
    }

    async fn mark_play_as_loss(&mut self, play_id: Uuid) -> anyhow::Result<()> {
        let prior = {
            let state = self.guard.as_mut().expect("transaction already committed");
            state.plays.iter_mut().find(|p| p.id == play_id).map(|play| {
                let prior_is_winner = play.is_winner;
                play.is_winner = false;
                prior_is_winner
            })
        };
        if let Some(prior_is_winner) = prior {
            self.undo.push(UndoOp::PlayWinnerFlag {
                play_id,
                prior_is_winner,
            });
        }
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> anyhow::Result<()> {
        self.committed = true;
        self.undo.clear();
        self.guard.take();
        Ok(())
    }
}
