use crate::{FieldPath, ValidationError, ValidationErrors};
use scc_controller_k8s_api::Sysctl;

/// Namespaced sysctls that every pod may set.
pub const SAFE_SYSCTLS: &[&str] = &[
    "kernel.shm_rmid_forced",
    "net.ipv4.ip_local_port_range",
    "net.ipv4.ip_unprivileged_port_start",
    "net.ipv4.tcp_syncookies",
    "net.ipv4.ping_group_range",
    "net.ipv4.ip_local_reserved_ports",
    "net.ipv4.tcp_keepalive_time",
    "net.ipv4.tcp_fin_timeout",
    "net.ipv4.tcp_keepalive_intvl",
    "net.ipv4.tcp_keepalive_probes",
];

/// Restricts the sysctls a pod may set.
///
/// Patterns are either exact names or a prefix ending in `*`, such as
/// `kernel.msg*`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SysctlStrategy {
    allowed_unsafe: Vec<String>,
    forbidden: Vec<String>,
}

fn matches(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => pattern == name,
    }
}

// === impl SysctlStrategy ===

impl SysctlStrategy {
    pub fn new(allowed_unsafe: &[String], forbidden: &[String]) -> Self {
        Self {
            allowed_unsafe: allowed_unsafe.to_vec(),
            forbidden: forbidden.to_vec(),
        }
    }

    pub fn validate(&self, field: &FieldPath, sysctls: &[Sysctl]) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        for (i, Sysctl { name, .. }) in sysctls.iter().enumerate() {
            if self.forbidden.iter().any(|p| matches(p, name)) {
                errors.push(ValidationError::forbidden(
                    field.index(i),
                    format!("sysctl {name:?} is not allowed"),
                ));
            } else if !SAFE_SYSCTLS.contains(&name.as_str())
                && !self.allowed_unsafe.iter().any(|p| matches(p, name))
            {
                errors.push(ValidationError::forbidden(
                    field.index(i),
                    format!("unsafe sysctl {name:?} is not allowed"),
                ));
            }
        }
        errors
    }
}
