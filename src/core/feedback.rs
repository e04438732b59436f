// src/core/feedback.rs
use rust_decimal::Decimal;
use std::collections::VecDeque;
use tracing::{info, warn};

use crate::config::LearningConfig;
use crate::strategies::traits::SignalProvider;
use crate::types::{TradeOutcome, TradeSignal};

/// Outcomes needed before accuracy is reported.
pub const MIN_OUTCOMES_FOR_ACCURACY: usize = 10;
/// Outcomes needed before a retrain is considered.
pub const MIN_OUTCOMES_FOR_RETRAIN: usize = 20;

/// Recent outcomes plus the prediction counter. Both reset together.
#[derive(Debug, Clone, Default)]
pub struct PerformanceWindow {
    outcomes: VecDeque<TradeOutcome>,
    predictions: u32,
}

impl PerformanceWindow {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn predictions(&self) -> u32 {
        self.predictions
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &TradeOutcome> {
        self.outcomes.iter()
    }

    fn reset(&mut self) {
        self.outcomes.clear();
        self.predictions = 0;
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PendingEvaluation {
    signal: TradeSignal,
    entry_price: Decimal,
    due_cycle: u64,
}

/// What a retrain check decided.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrainOutcome {
    Disabled,
    /// Prediction counter below the configured interval.
    NotDue,
    InsufficientData { outcomes: usize },
    /// Accuracy acceptable; only the prediction counter was reset.
    CounterReset { accuracy: f64 },
    /// Model retrained; window and counter cleared.
    Retrained { accuracy: f64 },
    /// Training entry point failed; bookkeeping kept for the next attempt.
    Failed { accuracy: f64, error: String },
}

pub struct FeedbackController {
    config: LearningConfig,
    window: PerformanceWindow,
    pending: VecDeque<PendingEvaluation>,
}

impl FeedbackController {
    pub fn new(config: &LearningConfig) -> Self {
        Self {
            config: config.clone(),
            window: PerformanceWindow::default(),
            pending: VecDeque::new(),
        }
    }

    pub fn window(&self) -> &PerformanceWindow {
        &self.window
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Scores a prediction immediately. HOLD is ignored.
    pub fn record(&mut self, signal: TradeSignal, entry_price: Decimal, outcome_price: Decimal) {
        if signal == TradeSignal::Hold {
            return;
        }
        self.window.predictions += 1;
        self.push_outcome(signal, entry_price, outcome_price);
    }

    /// Queues a prediction to be scored `evaluation_horizon_cycles` later.
    pub fn track(&mut self, signal: TradeSignal, entry_price: Decimal, cycle: u64) {
        if signal == TradeSignal::Hold {
            return;
        }
        self.window.predictions += 1;
        self.pending.push_back(PendingEvaluation {
            signal,
            entry_price,
            due_cycle: cycle + self.config.evaluation_horizon_cycles,
        });
    }

    /// Scores every tracked prediction whose horizon has elapsed at `cycle`.
    pub fn resolve_due(&mut self, price: Decimal, cycle: u64) -> usize {
        let mut resolved = 0;
        while self.pending.front().is_some_and(|p| p.due_cycle <= cycle) {
            if let Some(p) = self.pending.pop_front() {
                self.push_outcome(p.signal, p.entry_price, price);
                resolved += 1;
            }
        }
        resolved
    }

    /// Percentage of correct outcomes, `None` below ten outcomes.
    pub fn accuracy(&self) -> Option<f64> {
        let total = self.window.len();
        if total < MIN_OUTCOMES_FOR_ACCURACY {
            return None;
        }
        let correct = self.window.outcomes().filter(|o| o.correct).count();
        Some(100.0 * correct as f64 / total as f64)
    }

    /// Interval-gated retrain check.
    pub async fn maybe_retrain<P>(&mut self, provider: &mut P) -> RetrainOutcome
    where
        P: SignalProvider + ?Sized,
    {
        if !self.config.enable_self_learning {
            return RetrainOutcome::Disabled;
        }
        if self.window.predictions < self.config.retrain_interval_predictions {
            return RetrainOutcome::NotDue;
        }
        self.evaluate_now(provider).await
    }

    /// Retrain check without the prediction-interval gate.
    pub async fn evaluate_now<P>(&mut self, provider: &mut P) -> RetrainOutcome
    where
        P: SignalProvider + ?Sized,
    {
        if !self.config.enable_self_learning {
            return RetrainOutcome::Disabled;
        }
        let outcomes = self.window.len();
        let accuracy = match self.accuracy() {
            Some(a) if outcomes >= MIN_OUTCOMES_FOR_RETRAIN => a,
            _ => return RetrainOutcome::InsufficientData { outcomes },
        };

        if accuracy >= self.config.retrain_threshold_pct {
            self.window.predictions = 0;
            info!(accuracy, "Model accuracy acceptable, prediction counter reset");
            return RetrainOutcome::CounterReset { accuracy };
        }

        warn!(
            accuracy,
            threshold = self.config.retrain_threshold_pct,
            model = %provider.name(),
            "Model accuracy low, retraining"
        );
        match provider.retrain().await {
            Ok(()) => {
                self.window.reset();
                self.pending.clear();
                RetrainOutcome::Retrained { accuracy }
            }
            Err(e) => {
                warn!(error = %e, "Retraining failed, keeping performance window");
                RetrainOutcome::Failed {
                    accuracy,
                    error: e.to_string(),
                }
            }
        }
    }

    fn push_outcome(&mut self, signal: TradeSignal, entry_price: Decimal, outcome_price: Decimal) {
        let correct = match signal {
            TradeSignal::Buy => outcome_price > entry_price,
            TradeSignal::Sell => outcome_price < entry_price,
            TradeSignal::Hold => return,
        };
        if self.config.max_outcomes > 0 && self.window.outcomes.len() >= self.config.max_outcomes {
            self.window.outcomes.pop_front();
        }
        self.window.outcomes.push_back(TradeOutcome {
            signal,
            entry_price,
            outcome_price,
            correct,
        });
    }
}
