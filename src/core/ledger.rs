// src/core/ledger.rs
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::LedgerError;
use crate::types::{Balance, ExitReason, Position, PositionId, Side, TradeDecision};

/// An opposite-side position removed by a counter-trade.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub position: Position,
    /// Part of the position actually offset by the counter-trade fill.
    pub realized_size: Decimal,
    /// P/L on `realized_size` at the fill price.
    pub pnl: Decimal,
}

/// Result of applying one confirmed fill.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub position: Position,
    /// Opposite-side positions closed by this counter-trade, oldest first.
    pub closed: Vec<ClosedPosition>,
}

/// Sole owner of the balance and the open position set.
#[derive(Debug, Clone)]
pub struct PositionLedger {
    base_asset: String,
    quote_asset: String,
    balance: Balance,
    positions: BTreeMap<PositionId, Position>,
    next_id: PositionId,
}

impl PositionLedger {
    pub fn new(base_asset: impl Into<String>, quote_asset: impl Into<String>, balance: Balance) -> Self {
        Self {
            base_asset: base_asset.into(),
            quote_asset: quote_asset.into(),
            balance,
            positions: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn balance(&self) -> &Balance {
        &self.balance
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    /// Books a confirmed fill: moves balance, closes opposite positions, opens a new one.
    pub fn apply_fill(&mut self, decision: &TradeDecision, side: Side) -> Result<Fill, LedgerError> {
        if !decision.valid {
            return Err(LedgerError::InvalidDecision(
                decision.reason.clone().unwrap_or_else(|| "invalid decision".to_string()),
            ));
        }
        if decision.side != Some(side) {
            return Err(LedgerError::InvalidDecision(format!(
                "fill side {} does not match decision side {:?}",
                side, decision.side
            )));
        }
        let size = decision.position_size;
        let price = decision.entry_price;
        if size <= Decimal::ZERO || price <= Decimal::ZERO {
            return Err(LedgerError::InvalidDecision(format!(
                "non-positive size {} or price {}",
                size, price
            )));
        }

        self.move_balance(side, size, price)?;

        let ids: Vec<PositionId> = self
            .positions
            .values()
            .filter(|p| p.side == side.opposite())
            .map(|p| p.id)
            .collect();
        // the fill offsets the oldest positions first; anything past it is closed unrealized
        let mut unallocated = size;
        let mut closed = Vec::with_capacity(ids.len());
        for position in ids.into_iter().filter_map(|id| self.positions.remove(&id)) {
            let realized_size = position.size.min(unallocated);
            unallocated -= realized_size;
            let pnl = match position.side {
                Side::Buy => (price - position.entry_price) * realized_size,
                Side::Sell => (position.entry_price - price) * realized_size,
            };
            info!(
                id = position.id,
                side = %position.side,
                realized = %realized_size,
                pnl = %pnl,
                "Position closed by counter-trade"
            );
            closed.push(ClosedPosition {
                position,
                realized_size,
                pnl,
            });
        }

        let position = Position {
            id: self.next_id,
            side,
            size,
            entry_price: price,
            stop_loss: decision.stop_loss,
            take_profit: decision.take_profit,
            opened_at: Utc::now(),
        };
        self.next_id += 1;
        self.positions.insert(position.id, position.clone());

        info!(
            id = position.id,
            side = %side,
            size = %size,
            entry = %price,
            base = %self.balance.get(&self.base_asset),
            quote = %self.balance.get(&self.quote_asset),
            "Position opened"
        );

        Ok(Fill { position, closed })
    }

    /// Removes a position; balance is untouched.
    pub fn close_position(&mut self, id: PositionId) -> Result<Position, LedgerError> {
        let pos = self
            .positions
            .remove(&id)
            .ok_or(LedgerError::UnknownPosition(id))?;
        info!(id, "Position closed");
        Ok(pos)
    }

    /// Books an executed exit order at `price` and removes the position.
    pub fn settle_exit(&mut self, id: PositionId, price: Decimal) -> Result<Position, LedgerError> {
        let pos = self
            .positions
            .get(&id)
            .cloned()
            .ok_or(LedgerError::UnknownPosition(id))?;
        self.move_balance(pos.side.opposite(), pos.size, price)?;
        self.close_position(id)
    }

    pub fn unrealized_pnl(&self, live_price: Decimal) -> BTreeMap<PositionId, Decimal> {
        self.positions
            .values()
            .map(|p| (p.id, p.pnl_at(live_price)))
            .collect()
    }

    /// Positions whose stop-loss or take-profit has been crossed at `live_price`.
    pub fn triggered_exits(&self, live_price: Decimal) -> Vec<(PositionId, ExitReason)> {
        self.positions
            .values()
            .filter_map(|p| {
                let reason = match p.side {
                    Side::Buy if live_price <= p.stop_loss => ExitReason::StopLoss,
                    Side::Buy if live_price >= p.take_profit => ExitReason::TakeProfit,
                    Side::Sell if live_price >= p.stop_loss => ExitReason::StopLoss,
                    Side::Sell if live_price <= p.take_profit => ExitReason::TakeProfit,
                    _ => return None,
                };
                Some((p.id, reason))
            })
            .collect()
    }

    /// Adopts the exchange-reported balance (live mode).
    pub fn reconcile(&mut self, balance: Balance) {
        for asset in [&self.base_asset, &self.quote_asset] {
            let (ours, theirs) = (self.balance.get(asset), balance.get(asset));
            if ours != theirs {
                warn!(asset = %asset, ledger = %ours, exchange = %theirs, "Balance drift, adopting exchange value");
            }
        }
        self.balance = balance;
    }

    /// Reinstates persisted positions after a restart.
    pub fn restore(&mut self, positions: Vec<Position>) {
        for pos in positions {
            self.next_id = self.next_id.max(pos.id + 1);
            self.positions.insert(pos.id, pos);
        }
    }

    fn move_balance(&mut self, side: Side, size: Decimal, price: Decimal) -> Result<(), LedgerError> {
        let notional = size * price;
        let base = self.balance.get(&self.base_asset);
        let quote = self.balance.get(&self.quote_asset);

        let (new_base, new_quote) = match side {
            Side::Buy => (base + size, quote - notional),
            Side::Sell => (base - size, quote + notional),
        };

        if new_quote < Decimal::ZERO {
            return Err(LedgerError::InsufficientBalance {
                asset: self.quote_asset.clone(),
                needed: notional,
                available: quote,
            });
        }
        if new_base < Decimal::ZERO {
            return Err(LedgerError::InsufficientBalance {
                asset: self.base_asset.clone(),
                needed: size,
                available: base,
            });
        }

        self.balance.set(&self.base_asset, new_base);
        self.balance.set(&self.quote_asset, new_quote);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn decision(side: Side, size: Decimal, price: Decimal) -> TradeDecision {
        let (stop_loss, take_profit) =
            crate::core::risk::risk_levels(price, side, dec!(0.02), dec!(0.05));
        TradeDecision {
            valid: true,
            reason: None,
            side: Some(side),
            position_size: size,
            entry_price: price,
            stop_loss,
            take_profit,
        }
    }

    fn ledger() -> PositionLedger {
        PositionLedger::new("PI", "USDT", Balance::new().with("USDT", dec!(1000)).with("PI", dec!(2)))
    }

    #[test]
    fn buy_fill_moves_quote_into_base() {
        let mut ledger = ledger();
        let fill = ledger.apply_fill(&decision(Side::Buy, dec!(0.4), dec!(50)), Side::Buy).unwrap();
        assert_eq!(ledger.balance().get("PI"), dec!(2.4));
        assert_eq!(ledger.balance().get("USDT"), dec!(980));
        assert_eq!(fill.position.side, Side::Buy);
        assert!(fill.closed.is_empty());
    }

    #[test]
    fn sell_fill_is_the_inverse() {
        let mut ledger = ledger();
        ledger.apply_fill(&decision(Side::Sell, dec!(1), dec!(50)), Side::Sell).unwrap();
        assert_eq!(ledger.balance().get("PI"), dec!(1));
        assert_eq!(ledger.balance().get("USDT"), dec!(1050));
    }

    #[test]
    fn fill_that_would_overdraw_is_refused() {
        let mut ledger = ledger();
        let err = ledger
            .apply_fill(&decision(Side::Sell, dec!(3), dec!(50)), Side::Sell)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(ledger.balance().get("PI"), dec!(2));
        assert_eq!(ledger.open_count(), 0);
    }

    #[test]
    fn counter_trade_closes_opposite_positions() {
        let mut ledger = ledger();
        let buy = ledger.apply_fill(&decision(Side::Buy, dec!(0.4), dec!(50)), Side::Buy).unwrap();
        let sell = ledger.apply_fill(&decision(Side::Sell, dec!(0.4), dec!(55)), Side::Sell).unwrap();
        assert_eq!(
            sell.closed,
            vec![ClosedPosition {
                position: buy.position.clone(),
                realized_size: dec!(0.4),
                pnl: dec!(2),
            }]
        );
        assert_eq!(ledger.open_count(), 1);
        assert!(ledger.position(buy.position.id).is_none());
    }

    #[test]
    fn counter_trade_realizes_only_the_offset_size() {
        let mut ledger = ledger();
        let first = ledger.apply_fill(&decision(Side::Buy, dec!(0.4), dec!(50)), Side::Buy).unwrap();
        let second = ledger.apply_fill(&decision(Side::Buy, dec!(0.4), dec!(60)), Side::Buy).unwrap();
        let sell = ledger.apply_fill(&decision(Side::Sell, dec!(0.5), dec!(55)), Side::Sell).unwrap();

        let realized: Vec<(PositionId, Decimal, Decimal)> = sell
            .closed
            .iter()
            .map(|c| (c.position.id, c.realized_size, c.pnl))
            .collect();
        assert_eq!(
            realized,
            vec![
                (first.position.id, dec!(0.4), dec!(2)),
                (second.position.id, dec!(0.1), dec!(-0.5)),
            ]
        );
        assert_eq!(ledger.open_count(), 1);
    }

    #[test]
    fn fill_side_must_match_the_decision() {
        let mut ledger = ledger();
        let err = ledger
            .apply_fill(&decision(Side::Buy, dec!(0.4), dec!(50)), Side::Sell)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidDecision(_)));
        assert_eq!(ledger.balance().get("PI"), dec!(2));
        assert_eq!(ledger.open_count(), 0);
    }

    #[test]
    fn unrealized_pnl_per_position() {
        let mut ledger = ledger();
        let buy = ledger.apply_fill(&decision(Side::Buy, dec!(0.4), dec!(50)), Side::Buy).unwrap();
        let pnl = ledger.unrealized_pnl(dec!(60));
        assert_eq!(pnl[&buy.position.id], dec!(4));

        let mut ledger = self::ledger();
        let sell = ledger.apply_fill(&decision(Side::Sell, dec!(1), dec!(50)), Side::Sell).unwrap();
        assert_eq!(ledger.unrealized_pnl(dec!(60))[&sell.position.id], dec!(-10));
    }

    #[test]
    fn close_position_leaves_balance_untouched() {
        let mut ledger = ledger();
        let fill = ledger.apply_fill(&decision(Side::Buy, dec!(0.4), dec!(50)), Side::Buy).unwrap();
        let before = ledger.balance().clone();
        ledger.close_position(fill.position.id).unwrap();
        assert_eq!(ledger.balance(), &before);
        assert_eq!(
            ledger.close_position(fill.position.id).unwrap_err(),
            LedgerError::UnknownPosition(fill.position.id)
        );
    }

    #[test]
    fn stop_and_target_triggers() {
        let mut ledger = ledger();
        let buy = ledger.apply_fill(&decision(Side::Buy, dec!(0.4), dec!(100)), Side::Buy).unwrap();
        assert!(ledger.triggered_exits(dec!(100)).is_empty());
        assert_eq!(ledger.triggered_exits(dec!(97.5)), vec![(buy.position.id, ExitReason::StopLoss)]);
        assert_eq!(ledger.triggered_exits(dec!(105)), vec![(buy.position.id, ExitReason::TakeProfit)]);
    }

    #[test]
    fn settle_exit_realizes_and_removes() {
        let mut ledger = ledger();
        let buy = ledger.apply_fill(&decision(Side::Buy, dec!(0.4), dec!(50)), Side::Buy).unwrap();
        ledger.settle_exit(buy.position.id, dec!(55)).unwrap();
        assert_eq!(ledger.balance().get("PI"), dec!(2));
        assert_eq!(ledger.balance().get("USDT"), dec!(1002));
        assert_eq!(ledger.open_count(), 0);
    }

    #[test]
    fn restore_continues_id_sequence() {
        let mut ledger = ledger();
        let fill = ledger.apply_fill(&decision(Side::Buy, dec!(0.4), dec!(50)), Side::Buy).unwrap();
        let mut fresh = self::ledger();
        fresh.restore(vec![fill.position.clone()]);
        let next = fresh.apply_fill(&decision(Side::Buy, dec!(0.1), dec!(50)), Side::Buy).unwrap();
        assert!(next.position.id > fill.position.id);
    }
}
