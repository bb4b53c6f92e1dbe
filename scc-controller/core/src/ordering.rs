//! The order in which constraints are tried.
//!
//! Constraints with a higher priority are tried first. Among equal priorities
//! the more restrictive constraint wins, so that a pod is admitted under the
//! least privilege that suffices. Names break any remaining tie.

use crate::{
    strategy::{capabilities, volumes},
    Constraint, FsType, RunAsUserStrategy, SeLinuxStrategy,
};
use std::{cmp::Ordering, collections::HashSet};

const PRIVILEGED_POINTS: i64 = 1_000_000;
const HOST_PORTS_POINTS: i64 = 400_000;
const HOST_NETWORK_POINTS: i64 = 200_000;
const HOST_VOLUME_POINTS: i64 = 100_000;
const NON_TRIVIAL_VOLUME_POINTS: i64 = 50_000;

const RUN_AS_ANY_POINTS: i64 = 40_000;
const RUN_AS_NON_ROOT_POINTS: i64 = 30_000;
const RUN_AS_RANGE_POINTS: i64 = 20_000;
const RUN_AS_USER_POINTS: i64 = 10_000;

const CAP_DEFAULT_POINTS: i64 = 5_000;
const CAP_ADD_ONE_POINTS: i64 = 300;
const CAP_ALLOW_ALL_POINTS: i64 = 4_000;
const CAP_ALLOW_ONE_POINTS: i64 = 10;
const CAP_DROP_ALL_POINTS: i64 = -3_000;
const CAP_DROP_ONE_POINTS: i64 = -50;
const CAP_MAX_POINTS: i64 = 9_999;

/// Removes constraints whose name was already seen and sorts the rest into
/// evaluation order.
pub fn prioritize(constraints: impl IntoIterator<Item = Constraint>) -> Vec<Constraint> {
    let mut seen = HashSet::new();
    let mut constraints = constraints
        .into_iter()
        .filter(|c| seen.insert(c.name.clone()))
        .collect::<Vec<_>>();
    constraints.sort_by(compare);
    constraints
}

pub fn compare(a: &Constraint, b: &Constraint) -> Ordering {
    let priority = |c: &Constraint| c.priority.unwrap_or(0);
    priority(b)
        .cmp(&priority(a))
        .then_with(|| points(a).cmp(&points(b)))
        .then_with(|| a.name.cmp(&b.name))
}

/// Scores how much a constraint allows. Lower is more restrictive.
pub fn points(c: &Constraint) -> i64 {
    let mut points = 0;
    if c.allow_privileged_container {
        points += PRIVILEGED_POINTS;
    }
    if c.allow_host_network {
        points += HOST_NETWORK_POINTS;
    }
    if c.allow_host_ports {
        points += HOST_PORTS_POINTS;
    }
    points += volume_points(c);
    points += match c.se_linux_context {
        SeLinuxStrategy::RunAsAny => RUN_AS_ANY_POINTS,
        SeLinuxStrategy::MustRunAs(_) => 0,
    };
    points += match c.run_as_user {
        RunAsUserStrategy::RunAsAny => RUN_AS_ANY_POINTS,
        RunAsUserStrategy::MustRunAsNonRoot => RUN_AS_NON_ROOT_POINTS,
        RunAsUserStrategy::MustRunAsRange { .. } => RUN_AS_RANGE_POINTS,
        RunAsUserStrategy::MustRunAs { .. } => RUN_AS_USER_POINTS,
    };
    points + capability_points(c)
}

fn volume_points(c: &Constraint) -> i64 {
    if c.allow_host_dir_volume_plugin {
        return HOST_VOLUME_POINTS;
    }
    let non_trivial = c
        .volumes
        .iter()
        .any(|&fs| fs == FsType::All || !volumes::is_trivial(fs));
    if non_trivial {
        NON_TRIVIAL_VOLUME_POINTS
    } else {
        0
    }
}

fn capability_points(c: &Constraint) -> i64 {
    let len = |caps: &[String]| caps.len() as i64;
    let has = |caps: &[String], cap: &str| caps.iter().any(|c| c == cap);

    let mut points = CAP_DEFAULT_POINTS + CAP_ADD_ONE_POINTS * len(&c.default_add_capabilities);

    if has(&c.allowed_capabilities, capabilities::ALLOW_ALL)
        || has(&c.allowed_capabilities, capabilities::ALL)
    {
        points += CAP_ALLOW_ALL_POINTS;
    } else {
        points += CAP_ALLOW_ONE_POINTS * len(&c.allowed_capabilities);
    }

    if has(&c.required_drop_capabilities, capabilities::ALL) {
        points += CAP_DROP_ALL_POINTS;
    } else {
        points += CAP_DROP_ONE_POINTS * len(&c.required_drop_capabilities);
    }

    points.clamp(0, CAP_MAX_POINTS)
}
