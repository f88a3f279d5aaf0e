//! Tracks how much of the shared cash pool each bot has claimed, so that
//! no bot's allocation can push total commitments past what is actually
//! free on the exchange account (spec §4.8).

mod error;

pub use error::AccountingError;

use core_types::BotConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Running view of the shared USDT pool across every bot in the registry,
/// running or stopped.
#[derive(Debug, Clone)]
pub struct AllocationAccountant {
    usdt_free: Decimal,
    total_allocated: Decimal,
}

impl AllocationAccountant {
    /// Builds the accountant from the free balance reported by the
    /// exchange and the current registry of bot configs.
    pub fn new(usdt_free: Decimal, bots: &[BotConfig]) -> Self {
        let total_allocated = bots.iter().map(|b| b.allocated).sum();
        Self {
            usdt_free,
            total_allocated,
        }
    }

    pub fn usdt_free(&self) -> Decimal {
        self.usdt_free
    }

    pub fn total_allocated(&self) -> Decimal {
        self.total_allocated
    }

    /// `usdt_free - total_allocated`, i.e. how much headroom remains for a
    /// new or enlarged allocation.
    pub fn available_for_allocation(&self) -> Decimal {
        self.usdt_free - self.total_allocated
    }

    /// Validates that committing `requested` worth of new allocation (a
    /// brand-new bot, or an add-funds on an existing one) would not push
    /// total commitments past `usdt_free`. Does not mutate state; callers
    /// should follow a successful check with [`Self::record_allocation`].
    pub fn check_allocation(&self, requested: Decimal) -> Result<(), AccountingError> {
        let would_be_total = self.total_allocated + requested;
        if would_be_total > self.usdt_free {
            return Err(AccountingError::OverAllocation {
                requested,
                would_be_total,
                available: self.available_for_allocation(),
            });
        }
        Ok(())
    }

    /// Commits `amount` to the running total. Call only after
    /// [`Self::check_allocation`] has succeeded for the same amount.
    pub fn record_allocation(&mut self, amount: Decimal) {
        self.total_allocated += amount;
    }

    /// Releases `amount` back to the free pool, e.g. when a bot is deleted
    /// or its allocation is reduced.
    pub fn release_allocation(&mut self, amount: Decimal) {
        self.total_allocated -= amount;
    }

    /// The default per-bot allocation handed to newly auto-adopted orphan
    /// positions (spec §4.7.4, §4.8): a 90% share of free balance split
    /// evenly across the orphans discovered this pass, floored at twice
    /// the symbol's minimum notional so a bot never starts unable to add
    /// to its own position.
    pub fn default_orphan_allocation(
        usdt_free: Decimal,
        orphan_count: usize,
        min_notional: Decimal,
    ) -> Decimal {
        if orphan_count == 0 {
            return Decimal::ZERO;
        }
        let share = (usdt_free * dec!(0.9)) / Decimal::from(orphan_count as u64);
        let floor = min_notional * dec!(2);
        share.max(floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::{BotRunState, StrategyKind};
    use serde_json::json;
    use uuid::Uuid;

    fn bot(allocated: Decimal) -> BotConfig {
        let now = Utc::now();
        BotConfig {
            bot_id: Uuid::new_v4(),
            name: "test".into(),
            symbol: "BTCUSDT".into(),
            strategy: StrategyKind::Technical,
            strategy_params: json!({}),
            allocated,
            state: BotRunState::Stopped,
            has_traded: false,
            orphan_adopted: false,
            adopted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn sums_allocated_across_bots() {
        let bots = vec![bot(dec!(100)), bot(dec!(250))];
        let accountant = AllocationAccountant::new(dec!(1000), &bots);
        assert_eq!(accountant.total_allocated(), dec!(350));
        assert_eq!(accountant.available_for_allocation(), dec!(650));
    }

    #[test]
    fn rejects_overallocation() {
        let bots = vec![bot(dec!(900))];
        let accountant = AllocationAccountant::new(dec!(1000), &bots);
        let err = accountant.check_allocation(dec!(200)).unwrap_err();
        match err {
            AccountingError::OverAllocation {
                requested,
                would_be_total,
                available,
            } => {
                assert_eq!(requested, dec!(200));
                assert_eq!(would_be_total, dec!(1100));
                assert_eq!(available, dec!(100));
            }
        }
    }

    #[test]
    fn allows_allocation_exactly_at_limit() {
        let bots = vec![bot(dec!(900))];
        let accountant = AllocationAccountant::new(dec!(1000), &bots);
        assert!(accountant.check_allocation(dec!(100)).is_ok());
    }

    #[test]
    fn record_and_release_update_running_total() {
        let mut accountant = AllocationAccountant::new(dec!(1000), &[]);
        accountant.record_allocation(dec!(400));
        assert_eq!(accountant.total_allocated(), dec!(400));
        accountant.release_allocation(dec!(150));
        assert_eq!(accountant.total_allocated(), dec!(250));
    }

    #[test]
    fn default_orphan_allocation_splits_ninety_percent() {
        let alloc = AllocationAccountant::default_orphan_allocation(dec!(1000), 2, dec!(10));
        assert_eq!(alloc, dec!(450));
    }

    #[test]
    fn default_orphan_allocation_respects_min_notional_floor() {
        let alloc = AllocationAccountant::default_orphan_allocation(dec!(15), 3, dec!(10));
        assert_eq!(alloc, dec!(20));
    }

    #[test]
    fn default_orphan_allocation_zero_orphans_is_zero() {
        let alloc = AllocationAccountant::default_orphan_allocation(dec!(1000), 0, dec!(10));
        assert_eq!(alloc, Decimal::ZERO);
    }
}
