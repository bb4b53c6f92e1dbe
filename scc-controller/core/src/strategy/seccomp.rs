use crate::{FieldPath, ValidationError, ValidationErrors};
use scc_controller_k8s_api::SeccompProfile;

const ANY: &str = "*";
const RUNTIME_DEFAULT: &str = "runtime/default";
const DOCKER_DEFAULT: &str = "docker/default";
const UNCONFINED: &str = "unconfined";
const LOCALHOST_PREFIX: &str = "localhost/";

/// Restricts the seccomp profiles a pod or container may use. Profiles are
/// named `runtime/default`, `unconfined`, or `localhost/<path>`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeccompStrategy {
    allowed: Vec<String>,
}

/// Returns the name by which a profile is listed in a constraint.
pub fn profile_name(profile: &SeccompProfile) -> String {
    match profile.type_.as_str() {
        "RuntimeDefault" => RUNTIME_DEFAULT.to_string(),
        "Unconfined" => UNCONFINED.to_string(),
        "Localhost" => format!(
            "{LOCALHOST_PREFIX}{}",
            profile.localhost_profile.as_deref().unwrap_or_default()
        ),
        other => other.to_string(),
    }
}

fn profile_from_name(name: &str) -> Option<SeccompProfile> {
    let profile = match name {
        ANY => return None,
        RUNTIME_DEFAULT | DOCKER_DEFAULT => SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            localhost_profile: None,
        },
        UNCONFINED => SeccompProfile {
            type_: "Unconfined".to_string(),
            localhost_profile: None,
        },
        name => SeccompProfile {
            type_: "Localhost".to_string(),
            localhost_profile: Some(name.strip_prefix(LOCALHOST_PREFIX)?.to_string()),
        },
    };
    Some(profile)
}

// === impl SeccompStrategy ===

impl SeccompStrategy {
    pub fn new(allowed: &[String]) -> Self {
        Self {
            allowed: allowed.to_vec(),
        }
    }

    /// Uses the first listed profile when none is requested.
    pub fn generate(&self, requested: Option<&SeccompProfile>) -> Option<SeccompProfile> {
        if let Some(profile) = requested {
            return Some(profile.clone());
        }
        self.allowed.first().and_then(|name| profile_from_name(name))
    }

    pub fn validate(&self, field: &FieldPath, profile: Option<&SeccompProfile>) -> ValidationErrors {
        let Some(profile) = profile else {
            return ValidationErrors::default();
        };
        if self.allowed.is_empty() {
            return ValidationError::forbidden(field.clone(), "seccomp may not be set").into();
        }

        let name = profile_name(profile);
        let allowed = self.allowed.iter().any(|p| {
            p == ANY || *p == name || (p == DOCKER_DEFAULT && name == RUNTIME_DEFAULT)
        });
        if allowed {
            return ValidationErrors::default();
        }
        ValidationError::forbidden(field.clone(), format!("{name} is not a valid seccomp profile"))
            .into()
    }
}
