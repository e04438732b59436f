// src/core/profit.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info};

/// Realized trading statistics, persisted as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfitSummary {
    pub total_trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub total_profit: Decimal,
    pub total_loss: Decimal,
}

impl ProfitSummary {
    pub fn net(&self) -> Decimal {
        self.total_profit - self.total_loss
    }

    /// Share of winning trades in percent, 0 with no trades.
    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        100.0 * self.wins as f64 / self.total_trades as f64
    }
}

pub struct ProfitTracker {
    path: Option<PathBuf>,
    summary: ProfitSummary,
}

impl ProfitTracker {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            summary: ProfitSummary::default(),
        }
    }

    /// Loads existing statistics from `path`, starting empty when the file is absent or unreadable.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let summary = match tokio::fs::read_to_string(&path).await {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                error!("Failed to parse profit data {}: {}", path.display(), e);
                ProfitSummary::default()
            }),
            Err(_) => ProfitSummary::default(),
        };
        Self {
            path: Some(path),
            summary,
        }
    }

    pub fn summary(&self) -> &ProfitSummary {
        &self.summary
    }

    pub async fn record(&mut self, pnl: Decimal) {
        self.summary.total_trades += 1;
        if pnl > Decimal::ZERO {
            self.summary.wins += 1;
            self.summary.total_profit += pnl;
        } else {
            self.summary.losses += 1;
            self.summary.total_loss += pnl.abs();
        }
        info!(
            pnl = %pnl,
            net = %self.summary.net(),
            win_rate = self.summary.win_rate(),
            "Trade result recorded"
        );
        self.save().await;
    }

    async fn save(&self) {
        let Some(path) = &self.path else { return };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!("Failed to create {}: {}", parent.display(), e);
                return;
            }
        }
        match serde_json::to_string_pretty(&self.summary) {
            Ok(data) => {
                if let Err(e) = tokio::fs::write(path, data).await {
                    error!("Failed to save profit data: {}", e);
                }
            }
            Err(e) => error!("Failed to serialize profit data: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn wins_and_losses_are_split() {
        let mut tracker = ProfitTracker::in_memory();
        tracker.record(dec!(50)).await;
        tracker.record(dec!(-20)).await;
        tracker.record(dec!(0)).await;
        let s = tracker.summary();
        assert_eq!((s.total_trades, s.wins, s.losses), (3, 1, 2));
        assert_eq!(s.total_profit, dec!(50));
        assert_eq!(s.total_loss, dec!(20));
        assert_eq!(s.net(), dec!(30));
    }

    #[tokio::test]
    async fn summary_survives_reload() {
        let path = std::env::temp_dir().join(format!("profit-{}.json", uuid::Uuid::new_v4()));
        let mut tracker = ProfitTracker::load(path.clone()).await;
        tracker.record(dec!(12.5)).await;

        let reloaded = ProfitTracker::load(path.clone()).await;
        assert_eq!(reloaded.summary(), tracker.summary());
        let _ = tokio::fs::remove_file(&path).await;
    }
}
