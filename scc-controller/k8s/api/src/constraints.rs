use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Describes the runtime privileges a pod may request in order to be admitted.
///
/// Constraints are cluster-scoped. Ranges and SELinux levels that are left
/// unset are resolved against the annotations of the namespace a pod is
/// created in.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "security.scc.io",
    version = "v1",
    kind = "SecurityContextConstraints",
    shortname = "scc"
)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContextConstraintsSpec {
    /// Higher priorities are evaluated first. Unset sorts as zero.
    pub priority: Option<i32>,

    #[serde(default)]
    pub allow_privileged_container: bool,

    pub allow_privilege_escalation: Option<bool>,
    pub default_allow_privilege_escalation: Option<bool>,

    #[serde(default)]
    pub allowed_capabilities: Vec<String>,
    #[serde(default)]
    pub default_add_capabilities: Vec<String>,
    #[serde(default)]
    pub required_drop_capabilities: Vec<String>,

    #[serde(default)]
    pub allow_host_dir_volume_plugin: bool,
    #[serde(default)]
    pub volumes: Vec<FsType>,
    #[serde(default)]
    pub allowed_flex_volumes: Vec<AllowedFlexVolume>,

    #[serde(default)]
    pub allow_host_network: bool,
    #[serde(default)]
    pub allow_host_ports: bool,
    #[serde(default, rename = "allowHostPID")]
    pub allow_host_pid: bool,
    #[serde(default, rename = "allowHostIPC")]
    pub allow_host_ipc: bool,
    #[serde(default)]
    pub read_only_root_filesystem: bool,

    #[serde(default)]
    pub run_as_user: RunAsUserStrategyOptions,
    #[serde(default, rename = "seLinuxContext")]
    pub se_linux_context: SeLinuxContextStrategyOptions,
    #[serde(default)]
    pub run_as_group: GroupStrategyOptions,
    #[serde(default)]
    pub fs_group: GroupStrategyOptions,
    #[serde(default)]
    pub supplemental_groups: GroupStrategyOptions,

    /// Whether pods must run in their own user namespace.
    #[serde(default)]
    pub user_namespace_level: UserNamespaceLevel,

    #[serde(default)]
    pub seccomp_profiles: Vec<String>,
    #[serde(default)]
    pub allowed_unsafe_sysctls: Vec<String>,
    #[serde(default)]
    pub forbidden_sysctls: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunAsUserStrategyOptions {
    #[serde(rename = "type", default)]
    pub type_: RunAsUserStrategyType,
    pub uid: Option<i64>,
    pub uid_range_min: Option<i64>,
    pub uid_range_max: Option<i64>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum RunAsUserStrategyType {
    #[default]
    RunAsAny,
    MustRunAs,
    MustRunAsRange,
    MustRunAsNonRoot,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeLinuxContextStrategyOptions {
    #[serde(rename = "type", default)]
    pub type_: SeLinuxStrategyType,
    #[serde(rename = "seLinuxOptions")]
    pub se_linux_options: Option<SeLinuxOptions>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum SeLinuxStrategyType {
    #[default]
    RunAsAny,
    MustRunAs,
}

/// SELinux labels required by a `MustRunAs` strategy. Unset fields match any
/// value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SeLinuxOptions {
    pub user: Option<String>,
    pub role: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub level: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupStrategyOptions {
    #[serde(rename = "type", default)]
    pub type_: GroupStrategyType,
    #[serde(default)]
    pub ranges: Vec<IdRange>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum GroupStrategyType {
    #[default]
    RunAsAny,
    MustRunAs,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum UserNamespaceLevel {
    /// Pods may share the host's user namespace.
    #[default]
    AllowHostLevel,
    /// Pods must set `hostUsers: false`.
    RequirePodLevel,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct IdRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct AllowedFlexVolume {
    pub driver: String,
}

/// The kinds of volume source a pod may reference.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema,
)]
pub enum FsType {
    #[serde(rename = "awsElasticBlockStore")]
    AwsElasticBlockStore,
    #[serde(rename = "azureDisk")]
    AzureDisk,
    #[serde(rename = "azureFile")]
    AzureFile,
    #[serde(rename = "cephFS")]
    CephFs,
    #[serde(rename = "cinder")]
    Cinder,
    #[serde(rename = "configMap")]
    ConfigMap,
    #[serde(rename = "csi")]
    Csi,
    #[serde(rename = "downwardAPI")]
    DownwardApi,
    #[serde(rename = "emptyDir")]
    EmptyDir,
    #[serde(rename = "ephemeral")]
    Ephemeral,
    #[serde(rename = "fc")]
    Fc,
    #[serde(rename = "flexVolume")]
    FlexVolume,
    #[serde(rename = "flocker")]
    Flocker,
    #[serde(rename = "gcePersistentDisk")]
    GcePersistentDisk,
    #[serde(rename = "gitRepo")]
    GitRepo,
    #[serde(rename = "glusterfs")]
    Glusterfs,
    #[serde(rename = "hostPath")]
    HostPath,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "iscsi")]
    Iscsi,
    #[serde(rename = "nfs")]
    Nfs,
    #[serde(rename = "persistentVolumeClaim")]
    PersistentVolumeClaim,
    #[serde(rename = "photonPersistentDisk")]
    PhotonPersistentDisk,
    #[serde(rename = "portworxVolume")]
    PortworxVolume,
    #[serde(rename = "projected")]
    Projected,
    #[serde(rename = "quobyte")]
    Quobyte,
    #[serde(rename = "rbd")]
    Rbd,
    #[serde(rename = "scaleIO")]
    ScaleIo,
    #[serde(rename = "secret")]
    Secret,
    #[serde(rename = "storageOS")]
    StorageOs,
    #[serde(rename = "vsphere")]
    Vsphere,

    /// Matches every kind of volume.
    #[serde(rename = "*")]
    All,
}

// === impl FsType ===

impl FsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwsElasticBlockStore => "awsElasticBlockStore",
            Self::AzureDisk => "azureDisk",
            Self::AzureFile => "azureFile",
            Self::CephFs => "cephFS",
            Self::Cinder => "cinder",
            Self::ConfigMap => "configMap",
            Self::Csi => "csi",
            Self::DownwardApi => "downwardAPI",
            Self::EmptyDir => "emptyDir",
            Self::Ephemeral => "ephemeral",
            Self::Fc => "fc",
            Self::FlexVolume => "flexVolume",
            Self::Flocker => "flocker",
            Self::GcePersistentDisk => "gcePersistentDisk",
            Self::GitRepo => "gitRepo",
            Self::Glusterfs => "glusterfs",
            Self::HostPath => "hostPath",
            Self::Image => "image",
            Self::Iscsi => "iscsi",
            Self::Nfs => "nfs",
            Self::PersistentVolumeClaim => "persistentVolumeClaim",
            Self::PhotonPersistentDisk => "photonPersistentDisk",
            Self::PortworxVolume => "portworxVolume",
            Self::Projected => "projected",
            Self::Quobyte => "quobyte",
            Self::Rbd => "rbd",
            Self::ScaleIo => "scaleIO",
            Self::Secret => "secret",
            Self::StorageOs => "storageOS",
            Self::Vsphere => "vsphere",
            Self::All => "*",
        }
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
