//! Rule-based decision heuristics.
//!
//! - [`purchase`]: the rotating purchase queue used by the heuristic agent.
//! - [`movement`]: per-unit stepping, crowd avoidance and archer retreat,
//!   applied to every unit regardless of who controls its team's purchases.

pub mod movement;
pub mod purchase;

pub use movement::{move_candidates, process_unit_behavior, retreat_positions, Relocation};
pub use purchase::PurchaseQueue;
