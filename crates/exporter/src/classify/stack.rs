//! Stack transition table.
//!
//! `active/unhealthy` is a normal intermediate while a multi-container
//! service upgrades, so it installs a probe record instead of opening an
//! attempt. Success is only declared once no child service is flagged
//! mid-restart/mid-upgrade.

use crate::event::{Event, Health, ResourceState};

use super::{AttemptPhase, Classifier};

pub(super) fn apply(c: &mut Classifier, event: &Event) {
    match event.state {
        ResourceState::Active => match event.health {
            Health::Healthy => {
                if c.stacks.get(&event.id) == Some(&AttemptPhase::StackActiveInitializing) {
                    if c.parent_flags.contains_key(&event.id) {
                        // A child service is still restarting/upgrading;
                        // this healthy report is premature.
                        return;
                    }
                    c.sink.stack_succeeded(&event.name);
                    c.stacks.remove(&event.id);
                }
            }
            Health::Initializing => match c.stacks.get(&event.id) {
                None => {
                    c.stacks
                        .insert(event.id.clone(), AttemptPhase::StackActiveInitializing);
                    c.sink.stack_started(&event.name);
                }
                // The unhealthy probe turned out to be transient.
                Some(AttemptPhase::StackActiveUnhealthy) => {
                    c.stacks.remove(&event.id);
                }
                Some(_) => {}
            },
            Health::Unhealthy => match c.stacks.get(&event.id) {
                None => {
                    c.stacks
                        .insert(event.id.clone(), AttemptPhase::StackActiveUnhealthy);
                }
                Some(AttemptPhase::StackActiveInitializing) => {}
                Some(_) => {
                    c.stacks.remove(&event.id);
                }
            },
            _ => {}
        },
        ResourceState::Error => {
            if c.stacks.remove(&event.id).is_some() {
                c.sink.stack_failed(&event.name);
            }
        }
        ResourceState::Removed => {
            if c.stacks.remove(&event.id) == Some(AttemptPhase::StackActiveInitializing) {
                c.sink.stack_failed(&event.name);
            }
            c.names.evict_stack(&event.id);
        }
        _ => {}
    }
}
