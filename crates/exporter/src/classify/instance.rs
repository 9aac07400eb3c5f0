//! Instance transition table.
//!
//! Containers restart through `stopping → stopped/starting →
//! running(reinitializing) → running(healthy)`; the stop-side states are
//! tracked silently so the later reinitializing report can be attributed
//! to a restart attempt.

use crate::event::{Event, Health, ResourceState};

use super::{AttemptPhase, Classifier};

pub(super) fn apply(c: &mut Classifier, event: &Event) {
    match event.state {
        ResourceState::Starting => match c.instances.get(&event.id) {
            None => {
                c.instances
                    .insert(event.id.clone(), AttemptPhase::InstanceStarting);
                c.sink
                    .instance_started(&event.stack_name, &event.service_name, &event.name);
            }
            Some(AttemptPhase::InstanceStopping | AttemptPhase::InstanceStopped)
                if !event.health.is_empty() =>
            {
                c.instances
                    .insert(event.id.clone(), AttemptPhase::InstanceStarting);
            }
            Some(_) => {}
        },
        ResourceState::Stopping => {
            if event.health == Health::Healthy && !c.instances.contains_key(&event.id) {
                c.instances
                    .insert(event.id.clone(), AttemptPhase::InstanceStopping);
            }
        }
        ResourceState::Stopped => {
            if event.health == Health::Healthy {
                match c.instances.get(&event.id) {
                    None | Some(AttemptPhase::InstanceStopping) => {
                        c.instances
                            .insert(event.id.clone(), AttemptPhase::InstanceStopped);
                    }
                    Some(_) => {}
                }
            }
        }
        ResourceState::Running => match event.health {
            Health::Healthy => {
                if matches!(
                    c.instances.get(&event.id),
                    Some(
                        AttemptPhase::InstanceStarting
                            | AttemptPhase::InstanceRunningReinitializing
                    )
                ) {
                    c.sink
                        .instance_succeeded(&event.stack_name, &event.service_name, &event.name);
                    c.instances.remove(&event.id);
                }
            }
            Health::Reinitializing => {
                if matches!(
                    c.instances.get(&event.id),
                    Some(
                        AttemptPhase::InstanceStopping
                            | AttemptPhase::InstanceStopped
                            | AttemptPhase::InstanceStarting
                    )
                ) {
                    c.instances
                        .insert(event.id.clone(), AttemptPhase::InstanceRunningReinitializing);
                    c.sink
                        .instance_started(&event.stack_name, &event.service_name, &event.name);
                }
            }
            Health::UpdatingReinitializing => {
                if !c.instances.contains_key(&event.id) {
                    c.instances
                        .insert(event.id.clone(), AttemptPhase::InstanceRunningReinitializing);
                    c.sink
                        .instance_started(&event.stack_name, &event.service_name, &event.name);
                }
            }
            Health::Unhealthy => {
                if c.instances.remove(&event.id).is_some() {
                    c.sink
                        .instance_failed(&event.stack_name, &event.service_name, &event.name);
                }
            }
            _ => {}
        },
        ResourceState::Error => {
            // Upstream can report error before any tracked attempt; it
            // still counts as a failed bootstrap.
            c.instances.remove(&event.id);
            c.sink
                .instance_failed(&event.stack_name, &event.service_name, &event.name);
        }
        ResourceState::Removed => {
            if c.instances.remove(&event.id).is_some() && event.health == Health::Initializing {
                c.sink
                    .instance_failed(&event.stack_name, &event.service_name, &event.name);
            }
        }
        _ => {}
    }
}
