use crate::AllocationError;
use scc_controller_k8s_api::{FsType, SELinuxOptions, UserNamespaceLevel};
use std::{collections::BTreeSet, fmt};

/// A Linux capability name, e.g. `NET_ADMIN`.
pub type Capability = String;

/// A policy describing the runtime privileges a workload may use.
///
/// Constraints are plain values. They are checked when a [`Provider`] is
/// built from them and never change afterwards.
///
/// [`Provider`]: crate::Provider
#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub priority: Option<i32>,

    pub allow_privileged_container: bool,
    pub allow_privilege_escalation: bool,
    pub default_allow_privilege_escalation: Option<bool>,

    pub allowed_capabilities: Vec<Capability>,
    pub default_add_capabilities: Vec<Capability>,
    pub required_drop_capabilities: Vec<Capability>,

    pub run_as_user: RunAsUserStrategy,
    pub se_linux_context: SeLinuxStrategy,
    pub run_as_group: GroupStrategy,
    pub fs_group: GroupStrategy,
    pub supplemental_groups: GroupStrategy,
    pub user_namespace_level: UserNamespaceLevel,

    pub volumes: BTreeSet<FsType>,
    pub allowed_flex_volumes: Vec<String>,
    pub allow_host_dir_volume_plugin: bool,

    pub allow_host_network: bool,
    pub allow_host_ports: bool,
    pub allow_host_pid: bool,
    pub allow_host_ipc: bool,
    pub read_only_root_filesystem: bool,

    pub seccomp_profiles: Vec<String>,
    pub allowed_unsafe_sysctls: Vec<String>,
    pub forbidden_sysctls: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RunAsUserStrategy {
    #[default]
    RunAsAny,
    MustRunAs {
        uid: i64,
    },
    MustRunAsRange {
        min: i64,
        max: i64,
    },
    MustRunAsNonRoot,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum SeLinuxStrategy {
    #[default]
    RunAsAny,
    MustRunAs(SELinuxOptions),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum GroupStrategy {
    #[default]
    RunAsAny,
    MustRunAs(Vec<IdRange>),
}

/// An inclusive range of user or group IDs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{strategy} range {min}-{max} is empty")]
    EmptyRange {
        strategy: &'static str,
        min: i64,
        max: i64,
    },

    #[error("{strategy} MustRunAs requires at least one range")]
    MissingRanges { strategy: &'static str },

    #[error("MustRunAs requires a UID")]
    MissingUid,

    #[error("privilege escalation is allowed by default but not permitted")]
    DefaultPrivilegeEscalation,

    #[error("capability {0} is both added by default and required to be dropped")]
    ConflictingCapability(Capability),

    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

// === impl Constraint ===

impl Default for Constraint {
    /// The most restrictive constraint: nothing is allowed beyond what every
    /// pod may do, and every strategy accepts any value.
    fn default() -> Self {
        Self {
            name: String::new(),
            priority: None,
            allow_privileged_container: false,
            allow_privilege_escalation: true,
            default_allow_privilege_escalation: None,
            allowed_capabilities: Vec::new(),
            default_add_capabilities: Vec::new(),
            required_drop_capabilities: Vec::new(),
            run_as_user: RunAsUserStrategy::RunAsAny,
            se_linux_context: SeLinuxStrategy::RunAsAny,
            run_as_group: GroupStrategy::RunAsAny,
            fs_group: GroupStrategy::RunAsAny,
            supplemental_groups: GroupStrategy::RunAsAny,
            user_namespace_level: UserNamespaceLevel::AllowHostLevel,
            volumes: BTreeSet::new(),
            allowed_flex_volumes: Vec::new(),
            allow_host_dir_volume_plugin: false,
            allow_host_network: false,
            allow_host_ports: false,
            allow_host_pid: false,
            allow_host_ipc: false,
            read_only_root_filesystem: false,
            seccomp_profiles: Vec::new(),
            allowed_unsafe_sysctls: Vec::new(),
            forbidden_sysctls: Vec::new(),
        }
    }
}

impl Constraint {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

// === impl IdRange ===

impl IdRange {
    pub fn contains(&self, id: i64) -> bool {
        self.min <= id && id <= self.max
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}
