//! Service transition table.
//!
//! `restarting`/`upgrading` additionally raise the parent flag on the
//! owning stack so the stack table can withhold its success; the flag is
//! released when this service reaches `active`/`upgraded` again.

use crate::event::{Event, Health, ResourceState};

use super::{AttemptPhase, Classifier, ParentFlag};

pub(super) fn apply(c: &mut Classifier, event: &Event) {
    match event.state {
        ResourceState::Activating => {
            if event.health == Health::Healthy && !c.services.contains_key(&event.id) {
                c.services
                    .insert(event.id.clone(), AttemptPhase::ServiceActivatingHealthy);
                c.sink.service_started(&event.stack_name, &event.name);
            }
        }
        ResourceState::Active => {
            if c.parent_flags.get(&event.parent_id) == Some(&ParentFlag::Restarting) {
                c.parent_flags.remove(&event.parent_id);
            }
            match event.health {
                Health::Healthy => {
                    if matches!(
                        c.services.get(&event.id),
                        Some(
                            AttemptPhase::ServiceActivatingHealthy
                                | AttemptPhase::ServiceActiveInitializing
                                | AttemptPhase::ServiceRestarting
                        )
                    ) {
                        c.sink.service_succeeded(&event.stack_name, &event.name);
                        c.services.remove(&event.id);
                    }
                }
                Health::Initializing => {
                    if !c.services.contains_key(&event.id) {
                        c.services
                            .insert(event.id.clone(), AttemptPhase::ServiceActiveInitializing);
                        c.sink.service_started(&event.stack_name, &event.name);
                    }
                }
                Health::Unhealthy => {
                    if c.services.remove(&event.id).is_some() {
                        c.sink.service_failed(&event.stack_name, &event.name);
                    }
                }
                _ => {}
            }
        }
        ResourceState::Upgraded => {
            if c.parent_flags.get(&event.parent_id) == Some(&ParentFlag::Upgrading) {
                c.parent_flags.remove(&event.parent_id);
            }
            match event.health {
                Health::Healthy => {
                    if c.services.get(&event.id) == Some(&AttemptPhase::ServiceUpgrading) {
                        c.sink.service_succeeded(&event.stack_name, &event.name);
                        c.services.remove(&event.id);
                    }
                }
                Health::Unhealthy => {
                    if c.services.remove(&event.id).is_some() {
                        c.sink.service_failed(&event.stack_name, &event.name);
                    }
                }
                _ => {}
            }
        }
        ResourceState::Upgrading => {
            c.parent_flags
                .insert(event.parent_id.clone(), ParentFlag::Upgrading);
            if matches!(event.health, Health::Initializing | Health::Degraded)
                && !c.services.contains_key(&event.id)
            {
                c.services
                    .insert(event.id.clone(), AttemptPhase::ServiceUpgrading);
                c.sink.service_started(&event.stack_name, &event.name);
            }
        }
        ResourceState::Restarting => {
            c.parent_flags
                .insert(event.parent_id.clone(), ParentFlag::Restarting);
            if matches!(event.health, Health::Initializing | Health::Degraded)
                && !c.services.contains_key(&event.id)
            {
                c.services
                    .insert(event.id.clone(), AttemptPhase::ServiceRestarting);
                c.sink.service_started(&event.stack_name, &event.name);
            }
        }
        ResourceState::Inactive => {
            c.services.remove(&event.id);
        }
        ResourceState::Removed => {
            if c.services.remove(&event.id).is_some() && event.health == Health::Initializing {
                c.sink.service_failed(&event.stack_name, &event.name);
            }
            c.names.evict_service(&event.id);
        }
        _ => {}
    }
}
