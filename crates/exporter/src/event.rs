//! Event model — the normalized change event the classifier consumes.
//!
//! All JSON decoding happens at the ingress boundary (`rancher::subscribe`);
//! everything downstream of the ingress works on these types only.

/// Which level of the Rancher hierarchy a change event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityClass {
    Stack,
    Service,
    Instance,
}

/// Resource states the classifier dispatches on. Rancher grows new states
/// over time, so everything unrecognized collapses into `Other` and is
/// absorbed without effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Activating,
    Active,
    Error,
    Inactive,
    Removed,
    Restarting,
    Upgraded,
    Upgrading,
    Starting,
    Stopping,
    Stopped,
    Running,
    Other,
}

impl ResourceState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "activating" => ResourceState::Activating,
            "active" => ResourceState::Active,
            "error" => ResourceState::Error,
            "inactive" => ResourceState::Inactive,
            "removed" => ResourceState::Removed,
            "restarting" => ResourceState::Restarting,
            "upgraded" => ResourceState::Upgraded,
            "upgrading" => ResourceState::Upgrading,
            "starting" => ResourceState::Starting,
            "stopping" => ResourceState::Stopping,
            "stopped" => ResourceState::Stopped,
            "running" => ResourceState::Running,
            _ => ResourceState::Other,
        }
    }
}

/// Health states as reported by Rancher. `Empty` is a real wire value (the
/// field is often `""` while a resource transitions) and several transition
/// rules key on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unhealthy,
    Initializing,
    Degraded,
    Reinitializing,
    UpdatingReinitializing,
    Empty,
    Other,
}

impl Health {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "healthy" => Health::Healthy,
            "unhealthy" => Health::Unhealthy,
            "initializing" => Health::Initializing,
            "degraded" => Health::Degraded,
            "reinitializing" => Health::Reinitializing,
            "updating-reinitializing" => Health::UpdatingReinitializing,
            "" => Health::Empty,
            _ => Health::Other,
        }
    }

    pub fn is_empty(self) -> bool {
        self == Health::Empty
    }
}

/// A normalized resource-change event.
///
/// `stack_name` / `service_name` are best-effort resolved ancestor names;
/// the ingress substitutes a reserved tag when resolution fails so that
/// counter label tuples stay well-formed.
#[derive(Debug, Clone)]
pub struct Event {
    pub class: EntityClass,
    pub id: String,
    pub name: String,
    pub state: ResourceState,
    pub health: Health,
    /// Owning stack id for a Service, owning service id for an Instance.
    pub parent_id: String,
    pub stack_name: String,
    pub service_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_states_parse() {
        assert_eq!(ResourceState::parse("active"), ResourceState::Active);
        assert_eq!(ResourceState::parse("upgrading"), ResourceState::Upgrading);
        assert_eq!(ResourceState::parse("stopped"), ResourceState::Stopped);
    }

    #[test]
    fn unknown_state_is_other() {
        assert_eq!(ResourceState::parse("finishing_upgrade"), ResourceState::Other);
        assert_eq!(ResourceState::parse(""), ResourceState::Other);
    }

    #[test]
    fn health_empty_is_distinct() {
        assert_eq!(Health::parse(""), Health::Empty);
        assert!(Health::parse("").is_empty());
        assert!(!Health::parse("healthy").is_empty());
    }

    #[test]
    fn health_unknown_is_other() {
        assert_eq!(Health::parse("updating-reinitializing"), Health::UpdatingReinitializing);
        assert_eq!(Health::parse("started-once"), Health::Other);
    }
}
