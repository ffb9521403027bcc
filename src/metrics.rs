use std::time::Duration;

use anyhow::Context;
use prometheus::{Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};

/// Grounded on `predictiq-api::metrics::Metrics` — same `Registry` +
/// `IntCounterVec`/`HistogramVec` construction, same `render()` for the
/// `/metrics` scrape endpoint.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    plays_total: IntCounterVec,
    prize_assignments_total: IntCounterVec,
    stock_race_losses_total: IntCounterVec,
    failures_total: IntCounterVec,
    play_transaction_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let plays_total = IntCounterVec::new(
            prometheus::Opts::new("plays_total", "Plays recorded, by outcome"),
            &["outcome"],
        )
        .context("plays_total metric")?;

        let prize_assignments_total = IntCounterVec::new(
            prometheus::Opts::new(
                "prize_assignments_total",
                "Prize assignments created, by prize type",
            ),
            &["prize_type_id"],
        )
        .context("prize_assignments_total metric")?;

        let stock_race_losses_total = IntCounterVec::new(
            prometheus::Opts::new(
                "stock_race_losses_total",
                "Conditional stock decrements that lost the race (zero rows affected)",
            ),
            &["promotion_id"],
        )
        .context("stock_race_losses_total metric")?;

        let failures_total = IntCounterVec::new(
            prometheus::Opts::new("play_failures_total", "Play transaction failures, by kind"),
            &["kind"],
        )
        .context("play_failures_total metric")?;

        let play_transaction_duration = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "play_transaction_duration_seconds",
                "Play transaction latency in seconds",
            ),
            &["outcome"],
        )
        .context("play_transaction_duration metric")?;

        registry.register(Box::new(plays_total.clone()))?;
        registry.register(Box::new(prize_assignments_total.clone()))?;
        registry.register(Box::new(stock_race_losses_total.clone()))?;
        registry.register(Box::new(failures_total.clone()))?;
        registry.register(Box::new(play_transaction_duration.clone()))?;

        Ok(Self {
            registry,
            plays_total,
            prize_assignments_total,
            stock_race_losses_total,
            failures_total,
            play_transaction_duration,
        })
    }

    pub fn observe_play(&self, is_winner: bool) {
        let outcome = if is_winner { "win" } else { "loss" };
        self.plays_total.with_label_values(&[outcome]).inc();
    }

    pub fn observe_prize_assignment(&self, prize_type_id: &str) {
        self.prize_assignments_total
            .with_label_values(&[prize_type_id])
            .inc();
    }

    pub fn observe_stock_race_loss(&self, promotion_id: &str) {
        self.stock_race_losses_total
            .with_label_values(&[promotion_id])
            .inc();
    }

    pub fn observe_failure(&self, kind: &str) {
        self.failures_total.with_label_values(&[kind]).inc();
    }

    pub fn observe_play_transaction(&self, is_winner: bool, duration: Duration) {
        let outcome = if is_winner { "win" } else { "loss" };
        self.play_transaction_duration
            .with_label_values(&[outcome])
            .observe(duration.as_secs_f64());
    }

    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = vec![];
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
