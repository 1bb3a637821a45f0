//! ECS Systems for the dead-reckoning simulation.
//!
//! Systems contain the logic that operates on components.
//!
//! ## System Order
//!
//! One fixed update runs these systems as a single chain:
//!
//! 1. `movement_system` - integrates motion for local entities
//! 2. `remote_dead_reckoning_system` - extrapolates remote entities
//! 3. `ground_clamp_system` - clamps both onto terrain or water
//! 4. `update_decision_system` - decides whether local entities publish
//!
//! Clamping runs before the update decision so that published positions are
//! the clamped ones.

pub mod clamping;
pub mod dead_reckoning;
pub mod movement;
pub mod publish;

pub use clamping::*;
pub use dead_reckoning::*;
pub use movement::*;
pub use publish::*;
