//! Per-team energy.
//!
//! Energy is gained every turn and from kills, and spent on purchases.
//! All calculations use integer math.

use serde::{Deserialize, Serialize};

/// Starting energy of each team.
pub const INITIAL_ENERGY: i32 = 200;

/// Energy gained by each team at the start of every turn.
pub const ENERGY_PER_TURN: i32 = 30;

/// Energy pool of one team.
///
/// The balance never goes negative: [`TeamEconomy::spend`] is a
/// check-and-spend that leaves the balance untouched on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TeamEconomy {
    energy: i32,
    /// Lifetime energy spent on purchases.
    pub total_spent: i64,
    /// Lifetime energy received from income, rewards and refunds.
    pub total_earned: i64,
}

impl TeamEconomy {
    /// Create a pool with a starting balance.
    #[must_use]
    pub const fn new(energy: i32) -> Self {
        Self {
            energy: if energy < 0 { 0 } else { energy },
            total_spent: 0,
            total_earned: 0,
        }
    }

    /// Current balance.
    #[must_use]
    pub const fn energy(&self) -> i32 {
        self.energy
    }

    /// Add energy. Negative amounts are ignored.
    pub fn deposit(&mut self, amount: i32) {
        if amount > 0 {
            self.energy = self.energy.saturating_add(amount);
            self.total_earned += i64::from(amount);
        }
    }

    /// Spend energy if available.
    ///
    /// Returns true if the transaction succeeded.
    ///
    /// # Example
    ///
    /// ```
    /// use skirmish_core::economy::TeamEconomy;
    ///
    /// let mut eco = TeamEconomy::new(80);
    /// assert!(!eco.spend(81));
    /// assert_eq!(eco.energy(), 80);
    /// assert!(eco.spend(80));
    /// assert_eq!(eco.energy(), 0);
    /// ```
    pub fn spend(&mut self, amount: i32) -> bool {
        if amount >= 0 && self.energy >= amount {
            self.energy -= amount;
            self.total_spent += i64::from(amount);
            true
        } else {
            false
        }
    }

    /// Return energy from a purchase that could not be completed.
    pub fn refund(&mut self, amount: i32) {
        if amount > 0 {
            self.energy = self.energy.saturating_add(amount);
            self.total_spent -= i64::from(amount);
        }
    }

    /// Check if the team can afford a cost.
    #[must_use]
    pub const fn can_afford(&self, cost: i32) -> bool {
        self.energy >= cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_initial_balance() {
        let eco = TeamEconomy::new(INITIAL_ENERGY);
        assert_eq!(eco.energy(), 200);
        assert!(eco.can_afford(200));
        assert!(!eco.can_afford(201));
        assert_eq!(TeamEconomy::new(-10).energy(), 0);
    }

    #[test]
    fn test_spend_exact_balance() {
        let mut eco = TeamEconomy::new(100);
        assert!(eco.spend(100));
        assert_eq!(eco.energy(), 0);
        assert_eq!(eco.total_spent, 100);
    }

    #[test]
    fn test_failed_spend_leaves_balance() {
        let mut eco = TeamEconomy::new(79);
        assert!(!eco.spend(80));
        assert_eq!(eco.energy(), 79);
        assert_eq!(eco.total_spent, 0);
    }

    #[test]
    fn test_refund_restores_balance() {
        let mut eco = TeamEconomy::new(100);
        assert!(eco.spend(80));
        eco.refund(80);
        assert_eq!(eco.energy(), 100);
        assert_eq!(eco.total_spent, 0);
    }

    #[test]
    fn test_deposit_ignores_negative() {
        let mut eco = TeamEconomy::new(0);
        eco.deposit(ENERGY_PER_TURN);
        eco.deposit(-50);
        assert_eq!(eco.energy(), 30);
        assert_eq!(eco.total_earned, 30);
    }

    proptest! {
        #[test]
        fn prop_energy_never_negative(ops in proptest::collection::vec((any::<bool>(), 0i32..300), 0..60)) {
            let mut eco = TeamEconomy::new(INITIAL_ENERGY);
            for (is_spend, amount) in ops {
                let before = eco.energy();
                if is_spend {
                    let ok = eco.spend(amount);
                    if !ok {
                        prop_assert_eq!(eco.energy(), before);
                    }
                } else {
                    eco.deposit(amount);
                }
                prop_assert!(eco.energy() >= 0);
            }
        }
    }
}
