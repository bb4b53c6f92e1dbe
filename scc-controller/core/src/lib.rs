#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod allocation;
mod constraint;
mod field;
pub mod ordering;
mod provider;
mod selector;
pub mod strategy;


pub use self::{
    allocation::AllocationError,
    constraint::{
        Capability, ConfigError, Constraint, GroupStrategy, IdRange, RunAsUserStrategy,
        SeLinuxStrategy,
    },
    field::{ErrorKind, FieldPath, ValidationError, ValidationErrors},
    provider::Provider,
    selector::{select, select_container, Operation, SelectError, Selection},
};
pub use scc_controller_k8s_api::FsType;

/// Pod annotation naming the constraint a pod was admitted under.
pub const VALIDATED_ANNOTATION: &str = "openshift.io/scc";

/// Pod annotation naming the only constraint a pod may be admitted under.
pub const REQUIRED_ANNOTATION: &str = "openshift.io/required-scc";
