//! Rule-based purchasing.
//!
//! The agent keeps a short queue of unit kinds it intends to buy. It only
//! ever looks at the head: when the team can afford it, it asks for that
//! kind at a random living base, and rolls a fresh random kind onto the
//! tail once the purchase went through.

use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::rng::GameRng;
use crate::team::Team;
use crate::unit::UnitKind;
use crate::world::World;

/// Length of the purchase queue.
pub const QUEUE_LENGTH: usize = 5;

fn random_kind(rng: &mut GameRng) -> UnitKind {
    UnitKind::ALL[rng.gen_range(0..UnitKind::ALL.len())]
}

/// Rotating purchase plan of one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseQueue {
    queue: VecDeque<UnitKind>,
}

impl PurchaseQueue {
    /// Seed the queue with [`QUEUE_LENGTH`] random kinds.
    #[must_use]
    pub fn new(rng: &mut GameRng) -> Self {
        let queue = (0..QUEUE_LENGTH).map(|_| random_kind(rng)).collect();
        Self { queue }
    }

    /// Queue with a fixed plan.
    #[must_use]
    pub fn from_kinds(kinds: impl IntoIterator<Item = UnitKind>) -> Self {
        Self {
            queue: kinds.into_iter().collect(),
        }
    }

    /// Kind the agent wants next.
    #[must_use]
    pub fn head(&self) -> Option<UnitKind> {
        self.queue.front().copied()
    }

    /// Planned kinds, head first.
    pub fn iter(&self) -> impl Iterator<Item = UnitKind> + '_ {
        self.queue.iter().copied()
    }

    /// Decide the next action for `team`.
    ///
    /// Waits when the head is unaffordable or the team has no living base;
    /// otherwise spawns the head at a uniformly random living base.
    pub fn decide(&self, world: &World, team: Team, rng: &mut GameRng) -> Action {
        let Some(kind) = self.head() else {
            return Action::Wait;
        };
        if !world.economy(team).can_afford(kind.cost()) {
            return Action::Wait;
        }

        let living = world.living_base_indices(team);
        if living.is_empty() {
            return Action::Wait;
        }
        let index = living[rng.gen_range(0..living.len())];
        // Base lists hold a handful of entries.
        let index = i32::try_from(index).unwrap_or(i32::MAX);
        Action::spawn(index, kind)
    }

    /// Rotate after a completed purchase: drop the head, append a random kind.
    pub fn advance(&mut self, rng: &mut GameRng) {
        self.queue.pop_front();
        self.queue.push_back(random_kind(rng));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::map::GameMap;
    use crate::rng::seeded_rng;

    fn open_world() -> World {
        World::with_map(GameConfig::default(), GameMap::new(64)).unwrap()
    }

    #[test]
    fn test_seeded_queue_is_full() {
        let mut rng = seeded_rng(3);
        let queue = PurchaseQueue::new(&mut rng);
        assert_eq!(queue.iter().count(), QUEUE_LENGTH);
        assert_eq!(queue, PurchaseQueue::new(&mut seeded_rng(3)));
    }

    #[test]
    fn test_waits_when_head_unaffordable() {
        let mut world = open_world();
        assert!(world.spend_energy(Team::A, 150));
        let queue = PurchaseQueue::from_kinds([UnitKind::Caster, UnitKind::Archer]);
        let mut rng = seeded_rng(1);
        // Only the head matters even though an Archer would be affordable.
        assert_eq!(queue.decide(&world, Team::A, &mut rng), Action::Wait);
    }

    #[test]
    fn test_spawns_head_at_living_base() {
        let mut world = open_world();
        world.base_mut(0).unwrap().take_damage(10_000);
        world.base_mut(2).unwrap().take_damage(10_000);
        let queue = PurchaseQueue::from_kinds([UnitKind::Doctor]);
        let mut rng = seeded_rng(1);
        assert_eq!(
            queue.decide(&world, Team::A, &mut rng),
            Action::spawn(1, UnitKind::Doctor)
        );
    }

    #[test]
    fn test_waits_without_living_base() {
        let mut world = open_world();
        for id in 3..6 {
            world.base_mut(id).unwrap().take_damage(10_000);
        }
        let queue = PurchaseQueue::from_kinds([UnitKind::Archer]);
        let mut rng = seeded_rng(1);
        assert_eq!(queue.decide(&world, Team::B, &mut rng), Action::Wait);
    }

    #[test]
    fn test_advance_rotates() {
        let mut rng = seeded_rng(8);
        let mut queue = PurchaseQueue::from_kinds([
            UnitKind::Cavalry,
            UnitKind::Archer,
            UnitKind::Archer,
            UnitKind::Archer,
            UnitKind::Archer,
        ]);
        queue.advance(&mut rng);
        assert_eq!(queue.head(), Some(UnitKind::Archer));
        assert_eq!(queue.iter().count(), QUEUE_LENGTH);
    }
}
