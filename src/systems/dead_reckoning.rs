//! Dead reckoning system - draws remote entities at their extrapolated pose.

use crate::components::*;
use crate::dead_reckoning::DeadReckoningRecord;
use crate::systems::movement::DeltaTime;
use bevy_ecs::prelude::*;

/// System that extrapolates every remote entity from its last received update.
///
/// ## Data Access
/// - Reads: DeltaTime, Ownership
/// - Writes: DeadReckoningRecord (current pose only), Transform
pub fn remote_dead_reckoning_system(
    dt: Res<DeltaTime>,
    mut query: Query<(&Ownership, &mut DeadReckoningRecord, &mut Transform)>,
) {
    for (ownership, mut record, mut transform) in query.iter_mut() {
        if *ownership != Ownership::Remote {
            continue;
        }
        let (translation, rotation) = record.extrapolate(dt.0);
        transform.set_if_neq(Transform::new(translation, rotation));
    }
}
