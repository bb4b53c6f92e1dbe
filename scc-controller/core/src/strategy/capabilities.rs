use crate::{Capability, ConfigError, FieldPath, ValidationError, ValidationErrors};
use scc_controller_k8s_api::Capabilities;
use std::collections::BTreeSet;

/// Allows any capability to be added when present in the allowed list.
pub const ALLOW_ALL: &str = "*";

/// Drops every capability when present in a drop list.
pub const ALL: &str = "ALL";

/// Adds, requires, and restricts Linux capabilities on containers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilityStrategy {
    allowed: BTreeSet<Capability>,
    default_add: Vec<Capability>,
    required_drop: Vec<Capability>,
}

// === impl CapabilityStrategy ===

impl CapabilityStrategy {
    pub fn new(
        allowed: &[Capability],
        default_add: &[Capability],
        required_drop: &[Capability],
    ) -> Result<Self, ConfigError> {
        if let Some(cap) = default_add.iter().find(|&c| required_drop.contains(c)) {
            return Err(ConfigError::ConflictingCapability(cap.clone()));
        }

        Ok(Self {
            allowed: allowed.iter().cloned().collect(),
            default_add: default_add.to_vec(),
            required_drop: required_drop.to_vec(),
        })
    }

    /// Merges the default-add and required-drop capabilities into those the
    /// container requests, keeping the container's own entries first.
    pub fn generate(&self, requested: Option<&Capabilities>) -> Option<Capabilities> {
        if self.default_add.is_empty() && self.required_drop.is_empty() {
            return requested.cloned();
        }

        let mut add = requested.and_then(|c| c.add.clone()).unwrap_or_default();
        for cap in &self.default_add {
            if !add.contains(cap) {
                add.push(cap.clone());
            }
        }

        let mut drop = requested.and_then(|c| c.drop.clone()).unwrap_or_default();
        if !drop.iter().any(|c| c == ALL) {
            for cap in &self.required_drop {
                if !drop.contains(cap) {
                    drop.push(cap.clone());
                }
            }
        }

        Some(Capabilities {
            add: (!add.is_empty()).then_some(add),
            drop: (!drop.is_empty()).then_some(drop),
        })
    }

    pub fn validate(&self, field: &FieldPath, caps: Option<&Capabilities>) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        let add = caps.and_then(|c| c.add.as_deref()).unwrap_or_default();
        let drop = caps.and_then(|c| c.drop.as_deref()).unwrap_or_default();

        // Only capabilities the policy names in its required drops are
        // barred; requiring `ALL` to be dropped still permits allowed adds.
        for cap in add {
            if self.required_drop.contains(cap) {
                errors.push(ValidationError::forbidden(
                    field.child("add"),
                    format!("Capability is not allowed to be added: {cap} is required to be dropped"),
                ));
            } else if !self.allows(cap) {
                errors.push(ValidationError::forbidden(
                    field.child("add"),
                    format!("Capability is not allowed to be added: {cap}"),
                ));
            }
        }

        if !drop.iter().any(|c| c == ALL) {
            for cap in &self.required_drop {
                if !drop.contains(cap) {
                    errors.push(ValidationError::required(
                        field.child("drop"),
                        format!("{cap} is required to be dropped but was not found"),
                    ));
                }
            }
        }

        errors
    }

    fn allows(&self, cap: &Capability) -> bool {
        self.allowed.contains(ALLOW_ALL)
            || self.allowed.contains(cap)
            || self.default_add.contains(cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn caps(add: &[&str], drop: &[&str]) -> Capabilities {
        let list = |l: &[&str]| {
            (!l.is_empty()).then(|| l.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        };
        Capabilities {
            add: list(add),
            drop: list(drop),
        }
    }

    fn strategy(allowed: &[&str], default_add: &[&str], required_drop: &[&str]) -> CapabilityStrategy {
        let list = |l: &[&str]| l.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        CapabilityStrategy::new(&list(allowed), &list(default_add), &list(required_drop))
            .expect("strategy must be valid")
    }

    #[test]
    fn generates_defaults_and_required_drops() {
        let s = strategy(&[], &["foo"], &["bar"]);
        assert_eq!(s.generate(None), Some(caps(&["foo"], &["bar"])));
        assert_eq!(
            s.generate(Some(&caps(&["baz"], &["qux"]))),
            Some(caps(&["baz", "foo"], &["qux", "bar"]))
        );
        assert_eq!(
            s.generate(Some(&caps(&["foo"], &["ALL"]))),
            Some(caps(&["foo"], &["ALL"]))
        );
    }

    #[test]
    fn generate_leaves_unconfigured_containers_alone() {
        let s = strategy(&["foo"], &[], &[]);
        assert_eq!(s.generate(None), None);
        assert_eq!(s.generate(Some(&caps(&["foo"], &[]))), Some(caps(&["foo"], &[])));
    }

    #[test]
    fn adds_must_be_allowed() {
        let field = FieldPath::new("capabilities");
        let s = strategy(&["foo"], &["bar"], &[]);
        assert!(s.validate(&field, Some(&caps(&["foo", "bar"], &[]))).is_empty());

        let errors = s.validate(&field, Some(&caps(&["baz"], &[])));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.iter().next().unwrap().field.as_str(), "capabilities.add");

        let wildcard = strategy(&["*"], &[], &[]);
        assert!(wildcard
            .validate(&field, Some(&caps(&["anything"], &[])))
            .is_empty());
    }

    #[test]
    fn drop_wins_over_allowed() {
        let s = strategy(&["*"], &[], &["foo"]);
        let errors = s.validate(&FieldPath::new("capabilities"), Some(&caps(&["foo"], &["foo"])));
        assert_eq!(errors.len(), 1);
        assert!(errors
            .iter()
            .all(|e| e.detail.starts_with("Capability is not allowed to be added")));
    }

    #[test]
    fn required_drops_must_be_present() {
        let field = FieldPath::new("capabilities");
        let s = strategy(&[], &[], &["foo", "bar"]);

        let errors = s.validate(&field, Some(&caps(&[], &["foo"])));
        let details = errors.iter().map(|e| e.detail.as_str()).collect::<Vec<_>>();
        assert_eq!(details, ["bar is required to be dropped but was not found"]);

        assert_eq!(s.validate(&field, None).len(), 2);
        assert!(s.validate(&field, Some(&caps(&[], &["ALL"]))).is_empty());
    }

    #[test]
    fn widening_allowed_never_adds_errors() {
        let field = FieldPath::new("capabilities");
        let requested = caps(&["a", "b", "c"], &["d"]);
        let narrow = strategy(&["a"], &[], &["d"]);
        let wide = strategy(&["a", "b"], &[], &["d"]);
        let wide = wide.validate(&field, Some(&requested));
        let narrow = narrow.validate(&field, Some(&requested));
        assert!(wide.len() <= narrow.len());
    }

    #[test]
    fn conflicting_configuration() {
        let list = |l: &[&str]| l.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            CapabilityStrategy::new(&[], &list(&["foo"]), &list(&["foo"])),
            Err(ConfigError::ConflictingCapability("foo".into()))
        );
        assert!(CapabilityStrategy::new(&[], &list(&["foo"]), &list(&["ALL"])).is_ok());
    }

    #[test]
    fn drop_all_permits_allowed_adds() {
        let field = FieldPath::new("capabilities");
        let s = strategy(&["NET_BIND_SERVICE"], &[], &["ALL"]);

        assert!(s
            .validate(&field, Some(&caps(&["NET_BIND_SERVICE"], &["ALL"])))
            .is_empty());

        let errors = s.validate(&field, Some(&caps(&["NET_ADMIN"], &["ALL"])));
        let details = errors.iter().map(|e| e.detail.as_str()).collect::<Vec<_>>();
        assert_eq!(details, ["Capability is not allowed to be added: NET_ADMIN"]);

        let errors = s.validate(&field, Some(&caps(&["NET_BIND_SERVICE"], &[])));
        let details = errors.iter().map(|e| e.detail.as_str()).collect::<Vec<_>>();
        assert_eq!(details, ["ALL is required to be dropped but was not found"]);
    }

    #[test]
    fn drop_all_generation_keeps_default_adds() {
        let s = strategy(&[], &["NET_BIND_SERVICE"], &["ALL"]);
        let generated = s.generate(None);
        assert_eq!(generated, Some(caps(&["NET_BIND_SERVICE"], &["ALL"])));
        assert!(s
            .validate(&FieldPath::new("capabilities"), generated.as_ref())
            .is_empty());
    }
}
