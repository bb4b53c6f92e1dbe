use crate::{FieldPath, FsType, ValidationError, ValidationErrors};
use scc_controller_k8s_api::Volume;
use std::collections::BTreeSet;

/// Restricts the kinds of volume a pod may mount.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VolumeStrategy {
    allowed: BTreeSet<FsType>,
    allow_host_dir: bool,
    flex_drivers: Vec<String>,
}

/// Returns the kind of source a volume uses.
///
/// A volume that names no source is an empty directory, as the API server
/// defaults it.
pub fn fs_type(volume: &Volume) -> FsType {
    let sources = [
        (volume.aws_elastic_block_store.is_some(), FsType::AwsElasticBlockStore),
        (volume.azure_disk.is_some(), FsType::AzureDisk),
        (volume.azure_file.is_some(), FsType::AzureFile),
        (volume.cephfs.is_some(), FsType::CephFs),
        (volume.cinder.is_some(), FsType::Cinder),
        (volume.config_map.is_some(), FsType::ConfigMap),
        (volume.csi.is_some(), FsType::Csi),
        (volume.downward_api.is_some(), FsType::DownwardApi),
        (volume.empty_dir.is_some(), FsType::EmptyDir),
        (volume.ephemeral.is_some(), FsType::Ephemeral),
        (volume.fc.is_some(), FsType::Fc),
        (volume.flex_volume.is_some(), FsType::FlexVolume),
        (volume.flocker.is_some(), FsType::Flocker),
        (volume.gce_persistent_disk.is_some(), FsType::GcePersistentDisk),
        (volume.git_repo.is_some(), FsType::GitRepo),
        (volume.glusterfs.is_some(), FsType::Glusterfs),
        (volume.host_path.is_some(), FsType::HostPath),
        (volume.image.is_some(), FsType::Image),
        (volume.iscsi.is_some(), FsType::Iscsi),
        (volume.nfs.is_some(), FsType::Nfs),
        (volume.persistent_volume_claim.is_some(), FsType::PersistentVolumeClaim),
        (volume.photon_persistent_disk.is_some(), FsType::PhotonPersistentDisk),
        (volume.portworx_volume.is_some(), FsType::PortworxVolume),
        (volume.projected.is_some(), FsType::Projected),
        (volume.quobyte.is_some(), FsType::Quobyte),
        (volume.rbd.is_some(), FsType::Rbd),
        (volume.scale_io.is_some(), FsType::ScaleIo),
        (volume.secret.is_some(), FsType::Secret),
        (volume.storageos.is_some(), FsType::StorageOs),
        (volume.vsphere_volume.is_some(), FsType::Vsphere),
    ];
    sources
        .into_iter()
        .find_map(|(set, fs)| set.then_some(fs))
        .unwrap_or(FsType::EmptyDir)
}

/// Volume kinds that expose nothing beyond what the pod already has access
/// to.
pub fn is_trivial(fs: FsType) -> bool {
    matches!(
        fs,
        FsType::ConfigMap
            | FsType::DownwardApi
            | FsType::EmptyDir
            | FsType::PersistentVolumeClaim
            | FsType::Projected
            | FsType::Secret
    )
}

// === impl VolumeStrategy ===

impl VolumeStrategy {
    pub fn new(allowed: &BTreeSet<FsType>, allow_host_dir: bool, flex_drivers: &[String]) -> Self {
        Self {
            allowed: allowed.clone(),
            allow_host_dir,
            flex_drivers: flex_drivers.to_vec(),
        }
    }

    /// Host paths are governed only by the host directory flag; every other
    /// kind must be listed (or the wildcard listed).
    pub fn allows(&self, fs: FsType) -> bool {
        if fs == FsType::HostPath {
            return self.allow_host_dir;
        }
        self.allowed.contains(&FsType::All) || self.allowed.contains(&fs)
    }

    pub fn validate(&self, field: &FieldPath, volumes: &[Volume]) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        for (i, volume) in volumes.iter().enumerate() {
            let fs = fs_type(volume);
            if !self.allows(fs) {
                let detail = match fs {
                    FsType::HostPath => "Host Volumes are not allowed to be used".to_string(),
                    fs => format!("{fs} volumes are not allowed to be used"),
                };
                errors.push(ValidationError::forbidden(field.index(i), detail));
                continue;
            }

            if let Some(flex) = volume.flex_volume.as_ref() {
                if !self.flex_drivers.is_empty() && !self.flex_drivers.contains(&flex.driver) {
                    errors.push(ValidationError::forbidden(
                        field.index(i).child("driver"),
                        "Flexvolume driver is not allowed to be used",
                    ));
                }
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scc_controller_k8s_api::api::core::v1::{
        EmptyDirVolumeSource, FlexVolumeSource, HostPathVolumeSource, NFSVolumeSource,
        SecretVolumeSource,
    };

    fn host_path() -> Volume {
        Volume {
            name: "host".into(),
            host_path: Some(HostPathVolumeSource {
                path: "/".into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn flex(driver: &str) -> Volume {
        Volume {
            name: "flex".into(),
            flex_volume: Some(FlexVolumeSource {
                driver: driver.into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn detects_kinds() {
        assert_eq!(fs_type(&host_path()), FsType::HostPath);
        assert_eq!(
            fs_type(&Volume {
                name: "s".into(),
                secret: Some(SecretVolumeSource::default()),
                ..Default::default()
            }),
            FsType::Secret
        );
        assert_eq!(
            fs_type(&Volume {
                name: "e".into(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            }),
            FsType::EmptyDir
        );
        assert_eq!(
            fs_type(&Volume {
                name: "none".into(),
                ..Default::default()
            }),
            FsType::EmptyDir
        );
    }

    #[test]
    fn host_path_follows_flag_only() {
        let field = FieldPath::new("volumes");
        let all = [FsType::All].into_iter().collect();

        let errors = VolumeStrategy::new(&all, false, &[]).validate(&field, &[host_path()]);
        let details = errors.iter().map(|e| e.detail.as_str()).collect::<Vec<_>>();
        assert_eq!(details, ["Host Volumes are not allowed to be used"]);

        let none = BTreeSet::new();
        assert!(VolumeStrategy::new(&none, true, &[])
            .validate(&field, &[host_path()])
            .is_empty());
    }

    #[test]
    fn kinds_must_be_listed() {
        let field = FieldPath::new("volumes");
        let nfs = Volume {
            name: "nfs".into(),
            nfs: Some(NFSVolumeSource {
                path: "/export".into(),
                server: "nfs.example.com".into(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let errors = VolumeStrategy::new(&BTreeSet::new(), false, &[]).validate(&field, &[nfs.clone()]);
        assert_eq!(errors.len(), 1);
        let error = errors.iter().next().unwrap();
        assert_eq!(error.field.as_str(), "volumes[0]");
        assert_eq!(error.detail, "nfs volumes are not allowed to be used");

        let listed = [FsType::Nfs].into_iter().collect();
        assert!(VolumeStrategy::new(&listed, false, &[])
            .validate(&field, &[nfs])
            .is_empty());
    }

    #[test]
    fn flex_drivers() {
        let field = FieldPath::new("volumes");
        let allowed = [FsType::FlexVolume].into_iter().collect();

        let any = VolumeStrategy::new(&allowed, false, &[]);
        assert!(any.validate(&field, &[flex("example/lvm")]).is_empty());

        let listed = VolumeStrategy::new(&allowed, false, &["example/lvm".to_string()]);
        assert!(listed.validate(&field, &[flex("example/lvm")]).is_empty());
        let errors = listed.validate(&field, &[flex("example/nfs")]);
        assert_eq!(
            errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
            ["volumes[0].driver: Flexvolume driver is not allowed to be used"]
        );
    }
}
