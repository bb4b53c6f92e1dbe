//! Resolves constraint resources against a namespace's pre-allocated IDs.
//!
//! A constraint resource may leave its UID range, SELinux level, or group
//! ranges unset. Those are then taken from annotations on the namespace the
//! pod is created in, so that each namespace runs with its own IDs.

use crate::{
    ConfigError, Constraint, GroupStrategy, IdRange, Provider, RunAsUserStrategy, SeLinuxStrategy,
};
use scc_controller_k8s_api::{
    constraints::SeLinuxOptions, FsType, GroupStrategyOptions, GroupStrategyType,
    RunAsUserStrategyType, SELinuxOptions, SeLinuxStrategyType, SecurityContextConstraintsSpec,
};
use std::{collections::BTreeMap, str::FromStr};

pub const UID_RANGE_ANNOTATION: &str = "openshift.io/sa.scc.uid-range";
pub const MCS_ANNOTATION: &str = "openshift.io/sa.scc.mcs";
pub const SUPPLEMENTAL_GROUPS_ANNOTATION: &str = "openshift.io/sa.scc.supplemental-groups";

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    #[error("unable to find pre-allocated {kind} annotation for namespace {namespace:?}")]
    MissingAnnotation {
        kind: &'static str,
        namespace: String,
    },

    #[error("invalid {key} annotation {value:?} for namespace {namespace:?}: {reason}")]
    InvalidAnnotation {
        key: &'static str,
        value: String,
        namespace: String,
        reason: &'static str,
    },
}

/// A contiguous block of IDs, written `start/size` or `start-end`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub start: i64,
    pub end: i64,
}

/// Builds a constraint from a resource, taking unset ranges and levels from
/// the namespace's annotations.
pub fn resolve(
    name: &str,
    spec: &SecurityContextConstraintsSpec,
    namespace: &str,
    annotations: &BTreeMap<String, String>,
) -> Result<Constraint, ConfigError> {
    let ns = Namespace {
        name: namespace,
        annotations,
    };

    let run_as_user = match spec.run_as_user.type_ {
        RunAsUserStrategyType::RunAsAny => RunAsUserStrategy::RunAsAny,
        RunAsUserStrategyType::MustRunAsNonRoot => RunAsUserStrategy::MustRunAsNonRoot,
        RunAsUserStrategyType::MustRunAs => RunAsUserStrategy::MustRunAs {
            uid: spec.run_as_user.uid.ok_or(ConfigError::MissingUid)?,
        },
        RunAsUserStrategyType::MustRunAsRange => {
            match (spec.run_as_user.uid_range_min, spec.run_as_user.uid_range_max) {
                (Some(min), Some(max)) => RunAsUserStrategy::MustRunAsRange { min, max },
                _ => {
                    let block = ns.uid_blocks()?[0];
                    RunAsUserStrategy::MustRunAsRange {
                        min: block.start,
                        max: block.end,
                    }
                }
            }
        }
    };

    let se_linux_context = match spec.se_linux_context.type_ {
        SeLinuxStrategyType::RunAsAny => SeLinuxStrategy::RunAsAny,
        SeLinuxStrategyType::MustRunAs => {
            let SeLinuxOptions {
                user,
                role,
                type_,
                level,
            } = spec
                .se_linux_context
                .se_linux_options
                .clone()
                .unwrap_or_default();
            let level = match level.filter(|l| !l.is_empty()) {
                Some(level) => level,
                None => ns.mcs()?,
            };
            SeLinuxStrategy::MustRunAs(SELinuxOptions {
                user,
                role,
                type_,
                level: Some(level),
            })
        }
    };

    let fs_group = match spec.fs_group.type_ {
        GroupStrategyType::RunAsAny => GroupStrategy::RunAsAny,
        GroupStrategyType::MustRunAs if !spec.fs_group.ranges.is_empty() => {
            GroupStrategy::MustRunAs(ranges(&spec.fs_group.ranges))
        }
        GroupStrategyType::MustRunAs => {
            let start = ns.group_blocks()?[0].start;
            GroupStrategy::MustRunAs(vec![IdRange {
                min: start,
                max: start,
            }])
        }
    };

    let supplemental_groups = group_ranges(&spec.supplemental_groups, &ns)?;
    let run_as_group = group_ranges(&spec.run_as_group, &ns)?;

    let volumes = spec.volumes.iter().copied().collect();
    let allow_host_dir_volume_plugin = spec.allow_host_dir_volume_plugin
        || spec
            .volumes
            .iter()
            .any(|&fs| fs == FsType::HostPath || fs == FsType::All);

    Ok(Constraint {
        name: name.to_string(),
        priority: spec.priority,
        allow_privileged_container: spec.allow_privileged_container,
        allow_privilege_escalation: spec.allow_privilege_escalation.unwrap_or(true),
        default_allow_privilege_escalation: spec.default_allow_privilege_escalation,
        allowed_capabilities: spec.allowed_capabilities.clone(),
        default_add_capabilities: spec.default_add_capabilities.clone(),
        required_drop_capabilities: spec.required_drop_capabilities.clone(),
        run_as_user,
        se_linux_context,
        run_as_group,
        fs_group,
        supplemental_groups,
        user_namespace_level: spec.user_namespace_level,
        volumes,
        allowed_flex_volumes: spec
            .allowed_flex_volumes
            .iter()
            .map(|f| f.driver.clone())
            .collect(),
        allow_host_dir_volume_plugin,
        allow_host_network: spec.allow_host_network,
        allow_host_ports: spec.allow_host_ports,
        allow_host_pid: spec.allow_host_pid,
        allow_host_ipc: spec.allow_host_ipc,
        read_only_root_filesystem: spec.read_only_root_filesystem,
        seccomp_profiles: spec.seccomp_profiles.clone(),
        allowed_unsafe_sysctls: spec.allowed_unsafe_sysctls.clone(),
        forbidden_sysctls: spec.forbidden_sysctls.clone(),
    })
}

/// Checks a resource's own configuration.
///
/// Fields left to namespace pre-allocation are resolved against a nominal
/// allocation, so only values the resource sets itself are judged.
pub fn check(name: &str, spec: &SecurityContextConstraintsSpec) -> Result<(), ConfigError> {
    let nominal = [
        (UID_RANGE_ANNOTATION, "1000000000/10000"),
        (MCS_ANNOTATION, "s0:c1,c0"),
        (SUPPLEMENTAL_GROUPS_ANNOTATION, "1000000000/10000"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    Provider::new(resolve(name, spec, "", &nominal)?)?;
    Ok(())
}

/// Takes every pre-allocated group block when the resource lists no ranges.
fn group_ranges(
    opts: &GroupStrategyOptions,
    ns: &Namespace<'_>,
) -> Result<GroupStrategy, ConfigError> {
    let strategy = match opts.type_ {
        GroupStrategyType::RunAsAny => GroupStrategy::RunAsAny,
        GroupStrategyType::MustRunAs if !opts.ranges.is_empty() => {
            GroupStrategy::MustRunAs(ranges(&opts.ranges))
        }
        GroupStrategyType::MustRunAs => GroupStrategy::MustRunAs(
            ns.group_blocks()?
                .into_iter()
                .map(|b| IdRange {
                    min: b.start,
                    max: b.end,
                })
                .collect(),
        ),
    };
    Ok(strategy)
}

fn ranges(ranges: &[scc_controller_k8s_api::IdRange]) -> Vec<IdRange> {
    ranges
        .iter()
        .map(|r| IdRange {
            min: r.min,
            max: r.max,
        })
        .collect()
}

struct Namespace<'a> {
    name: &'a str,
    annotations: &'a BTreeMap<String, String>,
}

// === impl Namespace ===

impl Namespace<'_> {
    fn uid_blocks(&self) -> Result<Vec<Block>, AllocationError> {
        self.blocks(UID_RANGE_ANNOTATION, "uid")
    }

    /// Supplemental groups fall back to the UID range when the namespace
    /// has no group annotation.
    fn group_blocks(&self) -> Result<Vec<Block>, AllocationError> {
        if self.annotations.contains_key(SUPPLEMENTAL_GROUPS_ANNOTATION) {
            return self.blocks(SUPPLEMENTAL_GROUPS_ANNOTATION, "group");
        }
        self.blocks(UID_RANGE_ANNOTATION, "group")
    }

    fn mcs(&self) -> Result<String, AllocationError> {
        match self.annotations.get(MCS_ANNOTATION) {
            Some(level) if !level.is_empty() => Ok(level.clone()),
            _ => Err(AllocationError::MissingAnnotation {
                kind: "mcs",
                namespace: self.name.to_string(),
            }),
        }
    }

    fn blocks(&self, key: &'static str, kind: &'static str) -> Result<Vec<Block>, AllocationError> {
        let value = match self.annotations.get(key) {
            Some(value) if !value.trim().is_empty() => value,
            _ => {
                return Err(AllocationError::MissingAnnotation {
                    kind,
                    namespace: self.name.to_string(),
                })
            }
        };
        parse_blocks(value).map_err(|reason| AllocationError::InvalidAnnotation {
            key,
            value: value.clone(),
            namespace: self.name.to_string(),
            reason,
        })
    }
}

/// Parses a comma-separated list of blocks. The list is never empty.
pub fn parse_blocks(s: &str) -> Result<Vec<Block>, &'static str> {
    let blocks = s
        .split(',')
        .map(|b| b.trim().parse())
        .collect::<Result<Vec<Block>, _>>()?;
    if blocks.is_empty() {
        return Err("no blocks");
    }
    Ok(blocks)
}

// === impl Block ===

impl FromStr for Block {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |n: &str| n.trim().parse::<i64>().map_err(|_| "malformed block");
        if let Some((start, size)) = s.split_once('/') {
            let (start, size) = (parse(start)?, parse(size)?);
            if start < 0 || size < 1 {
                return Err("block must start at a non-negative ID and hold at least one ID");
            }
            let end = start
                .checked_add(size - 1)
                .ok_or("block overflows the ID space")?;
            return Ok(Self { start, end });
        }
        if let Some((start, end)) = s.split_once('-') {
            let (start, end) = (parse(start)?, parse(end)?);
            if start < 0 || end < start {
                return Err("block must start at a non-negative ID and end after it starts");
            }
            return Ok(Self { start, end });
        }
        Err("block must be written as start/size or start-end")
    }
}
