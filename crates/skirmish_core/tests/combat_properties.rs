//! Property tests for combat resolution.
//!
//! Every attacker/defender pairing, with and without the home-field bonus,
//! must follow `max(0, floor(attack * bonus) - armor)` and keep hp in bounds.

use proptest::prelude::*;
use skirmish_core::combat::outgoing_damage;
use skirmish_core::prelude::*;
use skirmish_test_utils::determinism::strategies::{arb_unit_kind, arb_unit_list};
use skirmish_test_utils::fixtures::open_world;

/// Attacker cell Manhattan 2 from team A's base at (8, 12), defender next to it.
const HOME_CELLS: (Position, Position) = (Position::new(9, 13), Position::new(10, 13));
/// Mid-map cells far from every base.
const FIELD_CELLS: (Position, Position) = (Position::new(30, 30), Position::new(31, 30));

proptest! {
    #[test]
    fn prop_single_hit_follows_damage_formula(
        attacker_kind in arb_unit_kind(),
        defender_kind in arb_unit_kind(),
        home in any::<bool>(),
    ) {
        let mut world = open_world();
        let (attacker_pos, defender_pos) = if home { HOME_CELLS } else { FIELD_CELLS };
        // Spawned first, so it strikes before the defender can answer.
        let attacker = world.spawn_unit(Team::A, attacker_kind, attacker_pos);
        let defender = world.spawn_unit(Team::B, defender_kind, defender_pos);

        let attack = attacker_kind.stats().attack;
        let expected_outgoing = if home {
            world.config().apply_home_field(attack)
        } else {
            attack
        };
        prop_assert_eq!(
            outgoing_damage(&world, world.unit(attacker).unwrap()),
            expected_outgoing
        );
        prop_assert_eq!(world.has_home_field(Team::A, attacker_pos), home);

        resolve_combat(&mut world);

        let stats = defender_kind.stats();
        let dealt = (expected_outgoing - stats.armor).max(0);
        let defender = world.unit(defender).unwrap();
        prop_assert_eq!(defender.hp(), (stats.max_hp - dealt).max(0));
        prop_assert!(defender.hp() >= 0 && defender.hp() <= defender.max_hp());
        prop_assert_eq!(defender.is_alive(), defender.hp() > 0);
    }

    #[test]
    fn prop_hp_stays_in_bounds_over_rounds(units in arb_unit_list(24), rounds in 1usize..6) {
        let mut world = open_world();
        for params in &units {
            if world.is_occupied(params.position, None) {
                continue;
            }
            let id = world.spawn_unit(params.team, params.kind, params.position);
            world.unit_mut(id).unwrap().set_hp(params.hp);
        }

        for _ in 0..rounds {
            let report = resolve_combat(&mut world);
            prop_assert!(report.heal_totals.iter().all(|h| *h >= 0));

            for unit in world.units() {
                prop_assert!(unit.hp() >= 0 && unit.hp() <= unit.max_hp());
                prop_assert_eq!(unit.is_alive(), unit.hp() > 0);
            }
            for base in world.bases() {
                prop_assert!(base.hp() >= 0 && base.hp() <= base.max_hp());
            }
        }
    }
}
