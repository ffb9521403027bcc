use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::{determine_outcome, Clock, CustomerSnapshot, RandomSource, WindowBounds};
use crate::errors::FailureKind;
use crate::metrics::Metrics;
use crate::models::TokenStatus;
use crate::repo::{AssignmentInsert, PromotionStore};

/// What `play()` returns on success (spec §6: `PlayResult`).
#[derive(Debug, Clone)]
pub struct PlayResult {
    pub is_winner: bool,
    pub prize_type_id: Option<Uuid>,
    pub prize_code: Option<String>,
}

/// The C8 play transaction, spec §4.7. `promotion_id`/`token_code` come
/// from the request path; `customer_id` comes only from the caller's
/// authenticated principal, never from the request body (enforced by the
/// caller of this function — see `handlers::play_handler`).
pub async fn play<S: PromotionStore>(
    store: &S,
    clock: &dyn Clock,
    rng: &dyn RandomSource,
    metrics: &Metrics,
    prize_code_retry_attempts: u32,
    deadline: Duration,
    promotion_id: Uuid,
    token_code: &str,
    customer_id: Uuid,
) -> Result<PlayResult, FailureKind> {
    let started = Instant::now();
    let result = match tokio::time::timeout(
        deadline,
        play_inner(
            store,
            clock,
            rng,
            metrics,
            prize_code_retry_attempts,
            promotion_id,
            token_code,
            customer_id,
        ),
    )
    .await
    {
        // The transaction's own future is dropped on timeout without ever
        // calling `commit()` — for `sqlx` this rolls back on drop, and the
        // mock store's transaction guard is simply released unused. Either
        // way, no side effects become visible (spec §5).
        Ok(inner) => inner,
        Err(_elapsed) => {
            tracing::warn!(%promotion_id, "play transaction exceeded its deadline, rolled back");
            Err(FailureKind::Internal)
        }
    };

    match &result {
        Ok(outcome) => {
            metrics.observe_play(outcome.is_winner);
            if let Some(prize_type_id) = outcome.prize_type_id {
                metrics.observe_prize_assignment(&prize_type_id.to_string());
            }
            metrics.observe_play_transaction(outcome.is_winner, started.elapsed());
        }
        Err(kind) => metrics.observe_failure(kind.code()),
    }

    result
}

async fn play_inner<S: PromotionStore>(
    store: &S,
    clock: &dyn Clock,
    rng: &dyn RandomSource,
    metrics: &Metrics,
    prize_code_retry_attempts: u32,
    promotion_id: Uuid,
    token_code: &str,
    customer_id: Uuid,
) -> Result<PlayResult, FailureKind> {
    // Steps 1-4: validation that short-circuits before the transaction.
    let token = store
        .load_token_by_code(token_code)
        .await
        .map_err(FailureKind::from)?
        .ok_or(FailureKind::TokenNotFound)?;

    if token.status != TokenStatus::Available {
        return Err(FailureKind::TokenAlreadyUsed);
    }
    if token.promotion_id != promotion_id {
        return Err(FailureKind::TokenWrongPromotion);
    }

    let customer = store
        .load_customer(customer_id)
        .await
        .map_err(FailureKind::from)?
        .ok_or(FailureKind::CustomerNotFound)?;
    if customer.promotion_id != promotion_id {
        return Err(FailureKind::CustomerWrongPromotion);
    }

    let promotion = store
        .load_promotion(promotion_id)
        .await
        .map_err(FailureKind::from)?
        .ok_or(FailureKind::Internal)?;

    let now = clock.now();

    // Step 5: single serializable/transactional scope. The token claim runs
    // first: the steps 1-4 check above is only an optimistic fast path, and
    // two concurrent callers for the same token can both pass it before
    // either has a transaction open. This conditional claim is what
    // actually enforces per-token linearizability (spec §5).
    let mut tx = store.begin().await.map_err(FailureKind::from)?;

    if !tx.mark_token_used(token.id, now).await.map_err(FailureKind::from)? {
        return Err(FailureKind::TokenAlreadyUsed);
    }

    let counts = tx.counts(promotion_id).await.map_err(FailureKind::from)?;
    let prize_types = tx
        .load_prize_types(promotion_id)
        .await
        .map_err(FailureKind::from)?;

    let customer_snapshot = CustomerSnapshot {
        first_name: customer.first_name.clone(),
        total_plays: customer.total_plays,
        total_wins: customer.total_wins,
        detected_gender: Some(customer.detected_gender),
    };

    let window = WindowBounds {
        start_time: promotion.start_time,
        end_time: promotion.end_time,
        now,
    };

    let outcome = determine_outcome(
        counts.total_tokens,
        counts.used_tokens,
        &prize_types,
        &customer_snapshot,
        counts.prizes_assigned_total,
        Some(window),
        rng,
    );

    let mut final_is_winner = false;
    let mut prize_type_id_out = None;
    let mut prize_code_out = None;

    if outcome.winner {
        let prize_type_id = outcome
            .prize_type_id
            .expect("Outcome.winner implies a chosen prize");

        let rows_affected = tx
            .conditional_decrement_stock(prize_type_id)
            .await
            .map_err(FailureKind::from)?;

        if rows_affected == 1 {
            let play = tx
                .insert_play(promotion_id, token.id, customer_id, true)
                .await
                .map_err(FailureKind::from)?;

            match assign_prize_code(
                tx.as_mut(),
                promotion_id,
                prize_type_id,
                customer_id,
                token.id,
                play.id,
                token_code,
                now,
                prize_code_retry_attempts,
            )
            .await
            .map_err(FailureKind::from)?
            {
                Some(code) => {
                    final_is_winner = true;
                    prize_type_id_out = Some(prize_type_id);
                    prize_code_out = Some(code);
                }
                None => {
                    // Bounded retries exhausted (spec §4.7.e, §9): the play
                    // is uncommitted, so rewriting it to a loss here does
                    // not break the "Play is immutable" invariant, which
                    // applies to committed state.
                    tx.mark_play_as_loss(play.id).await.map_err(FailureKind::from)?;
                }
            }
        } else {
            // Another transaction won the race for the last unit (spec §5,
            // §4.7.e) — the only race-loss recovery the core performs.
            metrics.observe_stock_race_loss(&promotion_id.to_string());
            tx.insert_play(promotion_id, token.id, customer_id, false)
                .await
                .map_err(FailureKind::from)?;
        }
    } else {
        tx.insert_play(promotion_id, token.id, customer_id, false)
            .await
            .map_err(FailureKind::from)?;
    }

    tx.increment_customer_counters(
        customer_id,
        final_is_winner,
        final_is_winner.then_some(now),
    )
    .await
    .map_err(FailureKind::from)?;

    tx.commit().await.map_err(FailureKind::from)?;

    // The spec's "one decision record" (§1): consumers are expected to
    // persist this themselves from the returned `PlayResult`, but it is
    // logged here as a structured event for operational observability.
    tracing::info!(
        %promotion_id,
        %customer_id,
        token_code,
        is_winner = final_is_winner,
        prize_type_id = ?prize_type_id_out,
        fatigue = outcome.factors.fatigue,
        pacing = outcome.factors.pacing,
        time_pressure = outcome.factors.time_pressure,
        final_modifier = outcome.factors.final_modifier,
        "play decision recorded",
    );

    Ok(PlayResult {
        is_winner: final_is_winner,
        prize_type_id: prize_type_id_out,
        prize_code: prize_code_out,
    })
}

/// Bounded retry loop for prize-code collisions. Returns `None` once
/// `attempts` fresh suffixes have all collided — the caller degrades the
/// already-inserted Play to a loss.
#[allow(clippy::too_many_arguments)]
async fn assign_prize_code(
    tx: &mut (dyn crate::repo::PromotionTx + '_),
    promotion_id: Uuid,
    prize_type_id: Uuid,
    customer_id: Uuid,
    token_id: Uuid,
    play_id: Uuid,
    token_code: &str,
    now: DateTime<Utc>,
    attempts: u32,
) -> anyhow::Result<Option<String>> {
    for attempt in 0..attempts.max(1) {
        let code = format_prize_code(token_code, now, attempt);
        match tx
            .insert_prize_assignment(promotion_id, prize_type_id, customer_id, token_id, play_id, &code)
            .await?
        {
            AssignmentInsert::Inserted(assignment) => return Ok(Some(assignment.prize_code)),
            AssignmentInsert::CodeConflict => continue,
        }
    }
    Ok(None)
}

/// `"WIN-" + tokenCode + "-" + zero-padded last-4-digits of now-millis`
/// (spec §6). `attempt` perturbs the suffix on retry so a fresh attempt
/// cannot collide with the one that was just rejected, even within the
/// same millisecond.
fn format_prize_code(token_code: &str, now: DateTime<Utc>, attempt: u32) -> String {
    let millis = now.timestamp_millis() + attempt as i64;
    let last4 = millis.rem_euclid(10_000);
    format!("WIN-{token_code}-{last4:04}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::random::FixedSource;
    use crate::engine::SystemClock;
    use crate::models::{Customer, Gender, GenderRestriction, Play, Promotion, PromotionStatus, PrizeType, Token};
    use crate::repo::{MockPromotionStore, PromotionCounts, PromotionTx};
    use async_trait::async_trait;

    /// A fake `PromotionTx` whose `insert_prize_assignment` always reports a
    /// collision, for driving `assign_prize_code` directly without going
    /// through a full `play()` call. Every other method is unreachable from
    /// that function.
    struct AlwaysConflictTx;

    #[async_trait]
    impl PromotionTx for AlwaysConflictTx {
        async fn counts(&mut self, _promotion_id: Uuid) -> anyhow::Result<PromotionCounts> {
            unreachable!("assign_prize_code never calls counts")
        }
        async fn load_prize_types(&mut self, _promotion_id: Uuid) -> anyhow::Result<Vec<PrizeType>> {
            unreachable!("assign_prize_code never calls load_prize_types")
        }
        async fn conditional_decrement_stock(&mut self, _prize_type_id: Uuid) -> anyhow::Result<u64> {
            unreachable!("assign_prize_code never calls conditional_decrement_stock")
        }
        async fn insert_play(
            &mut self,
            _promotion_id: Uuid,
            _token_id: Uuid,
            _customer_id: Uuid,
            _is_winner: bool,
        ) -> anyhow::Result<Play> {
            unreachable!("assign_prize_code never calls insert_play")
        }
        async fn insert_prize_assignment(
            &mut self,
            _promotion_id: Uuid,
            _prize_type_id: Uuid,
            _customer_id: Uuid,
            _token_id: Uuid,
            _play_id: Uuid,
            _prize_code: &str,
        ) -> anyhow::Result<AssignmentInsert> {
            Ok(AssignmentInsert::CodeConflict)
        }
        async fn mark_token_used(&mut self, _token_id: Uuid, _used_at: DateTime<Utc>) -> anyhow::Result<bool> {
            unreachable!("assign_prize_code never calls mark_token_used")
        }
        async fn increment_customer_counters(
            &mut self,
            _customer_id: Uuid,
            _won: bool,
            _last_win_at: Option<DateTime<Utc>>,
        ) -> anyhow::Result<()> {
            unreachable!("assign_prize_code never calls increment_customer_counters")
        }
        async fn mark_play_as_loss(&mut self, _play_id: Uuid) -> anyhow::Result<()> {
            unreachable!("assign_prize_code never calls mark_play_as_loss")
        }
        async fn commit(self: Box<Self>) -> anyhow::Result<()> {
            unreachable!("assign_prize_code never calls commit")
        }
    }

    #[tokio::test]
    async fn assign_prize_code_returns_none_once_retries_are_exhausted() {
        let mut tx = AlwaysConflictTx;
        let result = assign_prize_code(
            &mut tx,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "TOK-COLLIDE",
            Utc::now(),
            3,
        )
        .await
        .unwrap();

        assert!(result.is_none());
    }

    /// Wraps `MockPromotionStore` so `insert_prize_assignment` always
    /// collides, for exercising the end-to-end "retries exhausted degrades
    /// the Play to a loss" path (play.rs's `None =>` arm) without needing a
    /// real two-writer collision through the public API.
    struct AlwaysConflictStore {
        inner: MockPromotionStore,
    }

    #[async_trait]
    impl PromotionStore for AlwaysConflictStore {
        async fn load_token_by_code(&self, code: &str) -> anyhow::Result<Option<Token>> {
            self.inner.load_token_by_code(code).await
        }
        async fn load_customer(&self, id: Uuid) -> anyhow::Result<Option<Customer>> {
            self.inner.load_customer(id).await
        }
        async fn load_promotion(&self, id: Uuid) -> anyhow::Result<Option<Promotion>> {
            self.inner.load_promotion(id).await
        }
        async fn begin(&self) -> anyhow::Result<Box<dyn PromotionTx + '_>> {
            Ok(Box::new(AlwaysConflictingTx {
                inner: self.inner.begin().await?,
            }))
        }
    }

    struct AlwaysConflictingTx<'a> {
        inner: Box<dyn PromotionTx + 'a>,
    }

    #[async_trait]
    impl<'a> PromotionTx for AlwaysConflictingTx<'a> {
        async fn counts(&mut self, promotion_id: Uuid) -> anyhow::Result<PromotionCounts> {
            self.inner.counts(promotion_id).await
        }
        async fn load_prize_types(&mut self, promotion_id: Uuid) -> anyhow::Result<Vec<PrizeType>> {
            self.inner.load_prize_types(promotion_id).await
        }
        async fn conditional_decrement_stock(&mut self, prize_type_id: Uuid) -> anyhow::Result<u64> {
            self.inner.conditional_decrement_stock(prize_type_id).await
        }
        async fn insert_play(
            &mut self,
            promotion_id: Uuid,
            token_id: Uuid,
            customer_id: Uuid,
            is_winner: bool,
        ) -> anyhow::Result<Play> {
            self.inner.insert_play(promotion_id, token_id, customer_id, is_winner).await
        }
        async fn insert_prize_assignment(
            &mut self,
            _promotion_id: Uuid,
            _prize_type_id: Uuid,
            _customer_id: Uuid,
            _token_id: Uuid,
            _play_id: Uuid,
            _prize_code: &str,
        ) -> anyhow::Result<AssignmentInsert> {
            Ok(AssignmentInsert::CodeConflict)
        }
        async fn mark_token_used(&mut self, token_id: Uuid, used_at: DateTime<Utc>) -> anyhow::Result<bool> {
            self.inner.mark_token_used(token_id, used_at).await
        }
        async fn increment_customer_counters(
            &mut self,
            customer_id: Uuid,
            won: bool,
            last_win_at: Option<DateTime<Utc>>,
        ) -> anyhow::Result<()> {
            self.inner.increment_customer_counters(customer_id, won, last_win_at).await
        }
        async fn mark_play_as_loss(&mut self, play_id: Uuid) -> anyhow::Result<()> {
            self.inner.mark_play_as_loss(play_id).await
        }
        async fn commit(self: Box<Self>) -> anyhow::Result<()> {
            let this = *self;
            this.inner.commit().await
        }
    }

    #[tokio::test]
    async fn prize_code_retry_exhausted_degrades_existing_play_to_loss() {
        let inner = fresh_store();
        let promotion_id = Uuid::new_v4();
        let (_, customer_id) = seed_basic_promotion(&inner, promotion_id, "TOK-COLLIDE", 10).await;
        let store = AlwaysConflictStore { inner };

        let clock = SystemClock;
        let rng = FixedSource(0.0);
        let metrics = Metrics::new().unwrap();

        let result = play(
            &store,
            &clock,
            &rng,
            &metrics,
            3,
            Duration::from_secs(2),
            promotion_id,
            "TOK-COLLIDE",
            customer_id,
        )
        .await
        .unwrap();

        assert!(!result.is_winner);
        assert!(result.prize_code.is_none());
        assert_eq!(store.inner.assignment_count().await, 0);
        assert_eq!(store.inner.play_count().await, 1);

        let customer = store.inner.customer(customer_id).await.unwrap();
        assert_eq!(customer.total_plays, 1);
        assert_eq!(customer.total_wins, 0);
    }

    /// Delegates every `PromotionTx` method to an inner boxed transaction,
    /// but sleeps past the caller's deadline right after claiming the token
    /// — simulating a suspension point inside an in-flight transaction so
    /// `play()`'s `tokio::time::timeout` fires before `commit()`.
    struct SlowMarkTx<'a> {
        inner: Box<dyn PromotionTx + 'a>,
        delay: Duration,
    }

    #[async_trait]
    impl<'a> PromotionTx for SlowMarkTx<'a> {
        async fn counts(&mut self, promotion_id: Uuid) -> anyhow::Result<PromotionCounts> {
            self.inner.counts(promotion_id).await
        }
        async fn load_prize_types(&mut self, promotion_id: Uuid) -> anyhow::Result<Vec<PrizeType>> {
            self.inner.load_prize_types(promotion_id).await
        }
        async fn conditional_decrement_stock(&mut self, prize_type_id: Uuid) -> anyhow::Result<u64> {
            self.inner.conditional_decrement_stock(prize_type_id).await
        }
        async fn insert_play(
            &mut self,
            promotion_id: Uuid,
            token_id: Uuid,
            customer_id: Uuid,
            is_winner: bool,
        ) -> anyhow::Result<Play> {
            self.inner.insert_play(promotion_id, token_id, customer_id, is_winner).await
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
            self.inner
                .insert_prize_assignment(promotion_id, prize_type_id, customer_id, token_id, play_id, prize_code)
                .await
        }
        async fn mark_token_used(&mut self, token_id: Uuid, used_at: DateTime<Utc>) -> anyhow::Result<bool> {
            let claimed = self.inner.mark_token_used(token_id, used_at).await?;
            tokio::time::sleep(self.delay).await;
            Ok(claimed)
        }
        async fn increment_customer_counters(
            &mut self,
            customer_id: Uuid,
            won: bool,
            last_win_at: Option<DateTime<Utc>>,
        ) -> anyhow::Result<()> {
            self.inner.increment_customer_counters(customer_id, won, last_win_at).await
        }
        async fn mark_play_as_loss(&mut self, play_id: Uuid) -> anyhow::Result<()> {
            self.inner.mark_play_as_loss(play_id).await
        }
        async fn commit(self: Box<Self>) -> anyhow::Result<()> {
            let this = *self;
            this.inner.commit().await
        }
    }

    struct SlowMarkStore {
        inner: MockPromotionStore,
        delay: Duration,
    }

    #[async_trait]
    impl PromotionStore for SlowMarkStore {
        async fn load_token_by_code(&self, code: &str) -> anyhow::Result<Option<Token>> {
            self.inner.load_token_by_code(code).await
        }
        async fn load_customer(&self, id: Uuid) -> anyhow::Result<Option<Customer>> {
            self.inner.load_customer(id).await
        }
        async fn load_promotion(&self, id: Uuid) -> anyhow::Result<Option<Promotion>> {
            self.inner.load_promotion(id).await
        }
        async fn begin(&self) -> anyhow::Result<Box<dyn PromotionTx + '_>> {
            Ok(Box::new(SlowMarkTx {
                inner: self.inner.begin().await?,
                delay: self.delay,
            }))
        }
    }

    #[tokio::test]
    async fn deadline_expiry_leaves_no_visible_side_effects() {
        let inner = fresh_store();
        let promotion_id = Uuid::new_v4();
        let (token_id, customer_id) = seed_basic_promotion(&inner, promotion_id, "TOK-SLOW", 10).await;
        let store = SlowMarkStore {
            inner,
            delay: Duration::from_millis(200),
        };

        let clock = SystemClock;
        let rng = FixedSource(0.0);
        let metrics = Metrics::new().unwrap();

        let result = play(
            &store,
            &clock,
            &rng,
            &metrics,
            5,
            Duration::from_millis(20),
            promotion_id,
            "TOK-SLOW",
            customer_id,
        )
        .await;

        assert_eq!(result.unwrap_err(), FailureKind::Internal);

        let token = store.inner.token(token_id).await.unwrap();
        assert_eq!(token.status, TokenStatus::Available);
        assert_eq!(store.inner.play_count().await, 0);
        assert_eq!(store.inner.assignment_count().await, 0);

        let customer = store.inner.customer(customer_id).await.unwrap();
        assert_eq!(customer.total_plays, 0);

        // The same token can still be played normally afterwards — the
        // abandoned transaction left nothing behind to block it.
        let retry_metrics = Metrics::new().unwrap();
        let retried = play(
            &store,
            &clock,
            &rng,
            &retry_metrics,
            5,
            Duration::from_secs(2),
            promotion_id,
            "TOK-SLOW",
            customer_id,
        )
        .await
        .unwrap();
        assert!(retried.is_winner);
    }

    fn fresh_store() -> crate::repo::MockPromotionStore {
        crate::repo::MockPromotionStore::new()
    }

    async fn seed_basic_promotion(
        store: &crate::repo::MockPromotionStore,
        promotion_id: Uuid,
        token_code: &str,
        stock: i64,
    ) -> (Uuid, Uuid) {
        let token_id = Uuid::new_v4();
        let customer_id = Uuid::new_v4();
        let prize_type_id = Uuid::new_v4();

        store
            .seed_promotion(Promotion {
                id: promotion_id,
                tenant_id: Uuid::new_v4(),
                start_time: Utc::now() - chrono::Duration::hours(1),
                end_time: Utc::now() + chrono::Duration::hours(1),
                status: PromotionStatus::Active,
            })
            .await;
        store
            .seed_token(Token {
                id: token_id,
                promotion_id,
                code: token_code.to_string(),
                status: TokenStatus::Available,
                used_at: None,
            })
            .await;
        store
            .seed_customer(Customer {
                id: customer_id,
                promotion_id,
                phone_number: "5550000".into(),
                first_name: "Giulia".into(),
                last_name: "Rossi".into(),
                detected_gender: Gender::F,
                total_plays: 0,
                total_wins: 0,
                last_win_at: None,
            })
            .await;
        store
            .seed_prize_type(PrizeType {
                id: prize_type_id,
                promotion_id,
                name: "T-shirt".into(),
                initial_stock: stock,
                remaining_stock: stock,
                gender_restriction: GenderRestriction::None,
            })
            .await;

        (token_id, customer_id)
    }

    #[tokio::test]
    async fn happy_win_decrements_stock_and_creates_assignment() {
        let store = fresh_store();
        let promotion_id = Uuid::new_v4();
        let (_, customer_id) = seed_basic_promotion(&store, promotion_id, "TOK-1", 10).await;

        let clock = SystemClock;
        let rng = FixedSource(0.0);
        let metrics = Metrics::new().unwrap();

        let result = play(&store, &clock, &rng, &metrics, 5, Duration::from_secs(2), promotion_id, "TOK-1", customer_id)
            .await
            .unwrap();

        assert!(result.is_winner);
        assert!(result.prize_code.is_some());
        assert_eq!(store.assignment_count().await, 1);
        assert_eq!(store.play_count().await, 1);

        let customer = store.customer(customer_id).await.unwrap();
        assert_eq!(customer.total_plays, 1);
        assert_eq!(customer.total_wins, 1);
    }

    #[tokio::test]
    async fn reused_token_is_rejected_on_second_play() {
        let store = fresh_store();
        let promotion_id = Uuid::new_v4();
        let (_, customer_id) = seed_basic_promotion(&store, promotion_id, "TOK-2", 10).await;

        let clock = SystemClock;
        let rng = FixedSource(0.0);
        let metrics = Metrics::new().unwrap();

        play(&store, &clock, &rng, &metrics, 5, Duration::from_secs(2), promotion_id, "TOK-2", customer_id)
            .await
            .unwrap();

        let second = play(&store, &clock, &rng, &metrics, 5, Duration::from_secs(2), promotion_id, "TOK-2", customer_id).await;
        assert_eq!(second.unwrap_err(), FailureKind::TokenAlreadyUsed);
    }

    #[tokio::test]
    async fn token_not_found_is_reported() {
        let store = fresh_store();
        let clock = SystemClock;
        let rng = FixedSource(0.0);
        let metrics = Metrics::new().unwrap();

        let result = play(
            &store,
            &clock,
            &rng,
            &metrics,
            5,
            Duration::from_secs(2),
            Uuid::new_v4(),
            "NOPE",
            Uuid::new_v4(),
        )
        .await;
        assert_eq!(result.unwrap_err(), FailureKind::TokenNotFound);
    }

    #[tokio::test]
    async fn wrong_promotion_token_is_reported() {
        let store = fresh_store();
        let promotion_id = Uuid::new_v4();
        let (_, customer_id) = seed_basic_promotion(&store, promotion_id, "TOK-3", 10).await;

        let clock = SystemClock;
        let rng = FixedSource(0.0);
        let metrics = Metrics::new().unwrap();

        let other_promotion = Uuid::new_v4();
        let result = play(&store, &clock, &rng, &metrics, 5, Duration::from_secs(2), other_promotion, "TOK-3", customer_id).await;
        assert_eq!(result.unwrap_err(), FailureKind::TokenWrongPromotion);
    }

    #[tokio::test]
    async fn unknown_customer_is_reported() {
        let store = fresh_store();
        let promotion_id = Uuid::new_v4();
        let (_, _) = seed_basic_promotion(&store, promotion_id, "TOK-5", 10).await;

        let clock = SystemClock;
        let rng = FixedSource(0.0);
        let metrics = Metrics::new().unwrap();

        let result = play(
            &store,
            &clock,
            &rng,
            &metrics,
            5,
            Duration::from_secs(2),
            promotion_id,
            "TOK-5",
            Uuid::new_v4(),
        )
        .await;
        assert_eq!(result.unwrap_err(), FailureKind::CustomerNotFound);
    }

    #[tokio::test]
    async fn customer_from_another_promotion_is_rejected() {
        let store = fresh_store();
        let promotion_id = Uuid::new_v4();
        let other_promotion_id = Uuid::new_v4();
        let (_, customer_id) = seed_basic_promotion(&store, other_promotion_id, "TOK-6-OTHER", 10).await;
        seed_basic_promotion(&store, promotion_id, "TOK-6", 10).await;

        let clock = SystemClock;
        let rng = FixedSource(0.0);
        let metrics = Metrics::new().unwrap();

        let result = play(&store, &clock, &rng, &metrics, 5, Duration::from_secs(2), promotion_id, "TOK-6", customer_id)
            .await;
        assert_eq!(result.unwrap_err(), FailureKind::CustomerWrongPromotion);
    }

    #[tokio::test]
    async fn stock_exhausted_loses_without_decrementing_below_zero() {
        let store = fresh_store();
        let promotion_id = Uuid::new_v4();
        let (_, customer_id) = seed_basic_promotion(&store, promotion_id, "TOK-4", 0).await;

        let clock = SystemClock;
        let rng = FixedSource(0.0);
        let metrics = Metrics::new().unwrap();

        let result = play(&store, &clock, &rng, &metrics, 5, Duration::from_secs(2), promotion_id, "TOK-4", customer_id)
            .await
            .unwrap();
        assert!(!result.is_winner);
        assert_eq!(store.assignment_count().await, 0);
    }
}
