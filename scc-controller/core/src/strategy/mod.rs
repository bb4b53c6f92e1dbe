//! Evaluators for each dimension of a constraint.
//!
//! Each strategy generates a value for a field the workload left unset and
//! validates a value the workload requested. Validation never fails on an
//! unset field; generation fills it in first.

pub mod capabilities;
pub mod group;
pub mod seccomp;
pub mod selinux;
pub mod sysctl;
pub mod user;
pub mod volumes;
