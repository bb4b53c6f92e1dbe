#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod constraints;

pub use self::constraints::{
    AllowedFlexVolume, FsType, GroupStrategyOptions, GroupStrategyType, IdRange,
    RunAsUserStrategyOptions, RunAsUserStrategyType, SeLinuxContextStrategyOptions,
    SeLinuxStrategyType, SecurityContextConstraints, SecurityContextConstraintsSpec,
    UserNamespaceLevel,
};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{
            Capabilities, Container, ContainerPort, Namespace, Pod, PodSecurityContext, PodSpec,
            SELinuxOptions, SeccompProfile, SecurityContext, Sysctl, Volume,
        },
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
pub use kube::{
    api::{Api, ResourceExt},
    Client, Resource,
};
