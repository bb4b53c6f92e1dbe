use crate::{
    strategy::{
        capabilities::CapabilityStrategy, seccomp::SeccompStrategy, sysctl::SysctlStrategy,
        volumes::VolumeStrategy,
    },
    ConfigError, Constraint, FieldPath, RunAsUserStrategy, ValidationError, ValidationErrors,
};
use scc_controller_k8s_api::{
    Container, Pod, PodSecurityContext, PodSpec, SecurityContext, UserNamespaceLevel,
};

/// Evaluates pods and containers against a single [`Constraint`].
///
/// A provider is built once per constraint and may be shared freely; it holds
/// no state beyond its configuration.
#[derive(Clone, Debug)]
pub struct Provider {
    constraint: Constraint,
    capabilities: CapabilityStrategy,
    volumes: VolumeStrategy,
    seccomp: SeccompStrategy,
    sysctls: SysctlStrategy,
}

// === impl Provider ===

impl Provider {
    pub fn new(constraint: Constraint) -> Result<Self, ConfigError> {
        constraint.run_as_user.check()?;
        constraint.run_as_group.check("runAsGroup")?;
        constraint.fs_group.check("fsGroup")?;
        constraint.supplemental_groups.check("supplementalGroups")?;
        if constraint.default_allow_privilege_escalation == Some(true)
            && !constraint.allow_privilege_escalation
        {
            return Err(ConfigError::DefaultPrivilegeEscalation);
        }

        let capabilities = CapabilityStrategy::new(
            &constraint.allowed_capabilities,
            &constraint.default_add_capabilities,
            &constraint.required_drop_capabilities,
        )?;
        let volumes = VolumeStrategy::new(
            &constraint.volumes,
            constraint.allow_host_dir_volume_plugin,
            &constraint.allowed_flex_volumes,
        );
        let seccomp = SeccompStrategy::new(&constraint.seccomp_profiles);
        let sysctls = SysctlStrategy::new(
            &constraint.allowed_unsafe_sysctls,
            &constraint.forbidden_sysctls,
        );

        Ok(Self {
            constraint,
            capabilities,
            volumes,
            seccomp,
            sysctls,
        })
    }

    pub fn name(&self) -> &str {
        &self.constraint.name
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    /// Returns the pod's security context with every unset field the
    /// constraint can generate filled in.
    pub fn create_pod_security_context(&self, pod: &Pod) -> PodSecurityContext {
        let mut sc = pod_security_context(pod).cloned().unwrap_or_default();

        if sc.run_as_group.is_none() {
            sc.run_as_group = self.constraint.run_as_group.generate_single();
        }
        if sc.fs_group.is_none() {
            sc.fs_group = self.constraint.fs_group.generate_single();
        }
        if sc.supplemental_groups.as_ref().map_or(true, Vec::is_empty) {
            if let Some(groups) = self.constraint.supplemental_groups.generate() {
                sc.supplemental_groups = Some(groups);
            }
        }
        if sc.se_linux_options.is_none() {
            sc.se_linux_options = self.constraint.se_linux_context.generate();
        }
        if sc.seccomp_profile.is_none() {
            sc.seccomp_profile = self.seccomp.generate(None);
        }

        sc
    }

    /// Returns the container's security context with every unset field the
    /// constraint can generate filled in.
    ///
    /// The UID and SELinux labels are only generated when the pod does not
    /// already set them, since the container inherits the pod's values.
    pub fn create_container_security_context(
        &self,
        pod: &Pod,
        container: &Container,
    ) -> SecurityContext {
        let pod_sc = pod_security_context(pod);
        let mut sc = container.security_context.clone().unwrap_or_default();

        let pod_uid = pod_sc.and_then(|p| p.run_as_user);
        if sc.run_as_user.is_none() && pod_uid.is_none() {
            sc.run_as_user = self.constraint.run_as_user.generate();
        }

        if self.constraint.run_as_user == RunAsUserStrategy::MustRunAsNonRoot
            && sc.run_as_user.is_none()
            && pod_uid.is_none()
            && sc.run_as_non_root.is_none()
            && pod_sc.and_then(|p| p.run_as_non_root).is_none()
        {
            sc.run_as_non_root = Some(true);
        }

        if sc.se_linux_options.is_none() && pod_sc.and_then(|p| p.se_linux_options.as_ref()).is_none() {
            sc.se_linux_options = self.constraint.se_linux_context.generate();
        }

        sc.capabilities = self.capabilities.generate(sc.capabilities.as_ref());

        if sc.read_only_root_filesystem.is_none() && self.constraint.read_only_root_filesystem {
            sc.read_only_root_filesystem = Some(true);
        }

        if sc.allow_privilege_escalation.is_none() {
            sc.allow_privilege_escalation = match self.constraint.default_allow_privilege_escalation {
                Some(default) => Some(default),
                None if !self.constraint.allow_privilege_escalation => Some(false),
                None => None,
            };
        }

        sc
    }

    /// Validates the pod-level fields against the constraint. `field` is the
    /// path of the pod spec, typically `spec`.
    pub fn validate_pod_security_context(&self, pod: &Pod, field: &FieldPath) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        let empty = PodSpec::default();
        let spec = pod.spec.as_ref().unwrap_or(&empty);

        let host = [
            (spec.host_network, self.constraint.allow_host_network, "hostNetwork", "Host network"),
            (spec.host_pid, self.constraint.allow_host_pid, "hostPID", "Host PID"),
            (spec.host_ipc, self.constraint.allow_host_ipc, "hostIPC", "Host IPC"),
        ];
        for (requested, allowed, name, desc) in host {
            if requested == Some(true) && !allowed {
                errors.push(ValidationError::invalid(
                    field.child(name),
                    format!("{desc} is not allowed to be used"),
                ));
            }
        }

        let sc_field = field.child("securityContext");

        // Pods share the host's user namespace unless `hostUsers` is false.
        if self.constraint.user_namespace_level == UserNamespaceLevel::RequirePodLevel
            && spec.host_users != Some(false)
        {
            errors.push(ValidationError::invalid(
                sc_field.child("hostUsers"),
                "Host Users must be set to false",
            ));
        }

        if let Some(sc) = spec.security_context.as_ref() {
            errors.extend(
                self.constraint
                    .run_as_group
                    .validate(&sc_field.child("runAsGroup"), sc.run_as_group.as_slice()),
            );
            errors.extend(
                self.constraint
                    .fs_group
                    .validate(&sc_field.child("fsGroup"), sc.fs_group.as_slice()),
            );
            errors.extend(self.constraint.supplemental_groups.validate(
                &sc_field.child("supplementalGroups"),
                sc.supplemental_groups.as_deref().unwrap_or_default(),
            ));
            errors.extend(
                self.constraint
                    .se_linux_context
                    .validate(&sc_field.child("seLinuxOptions"), sc.se_linux_options.as_ref()),
            );
            errors.extend(
                self.constraint
                    .run_as_user
                    .validate(&sc_field.child("runAsUser"), sc.run_as_user),
            );
            errors.extend(
                self.seccomp
                    .validate(&sc_field.child("seccompProfile"), sc.seccomp_profile.as_ref()),
            );
            errors.extend(self.sysctls.validate(
                &sc_field.child("sysctls"),
                sc.sysctls.as_deref().unwrap_or_default(),
            ));
        }

        errors.extend(self.volumes.validate(
            &field.child("volumes"),
            spec.volumes.as_deref().unwrap_or_default(),
        ));

        errors
    }

    /// Validates a container's effective security context against the
    /// constraint. `field` is the path of the container, e.g.
    /// `spec.containers[0]`.
    pub fn validate_container_security_context(
        &self,
        pod: &Pod,
        container: &Container,
        field: &FieldPath,
    ) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        let pod_sc = pod_security_context(pod);
        let empty = SecurityContext::default();
        let sc = container.security_context.as_ref().unwrap_or(&empty);
        let sc_field = field.child("securityContext");

        let uid = sc.run_as_user.or_else(|| pod_sc.and_then(|p| p.run_as_user));
        errors.extend(
            self.constraint
                .run_as_user
                .validate(&sc_field.child("runAsUser"), uid),
        );
        if self.constraint.run_as_user == RunAsUserStrategy::MustRunAsNonRoot && uid.is_none() {
            let non_root = sc
                .run_as_non_root
                .or_else(|| pod_sc.and_then(|p| p.run_as_non_root));
            if non_root == Some(false) {
                errors.push(ValidationError::invalid(
                    sc_field.child("runAsNonRoot"),
                    "must be true when no non-root UID is set",
                ));
            }
        }

        // Only a group the container sets itself is checked here; the pod's
        // own group is checked with the pod.
        errors.extend(
            self.constraint
                .run_as_group
                .validate(&sc_field.child("runAsGroup"), sc.run_as_group.as_slice()),
        );

        let se_linux = sc
            .se_linux_options
            .as_ref()
            .or_else(|| pod_sc.and_then(|p| p.se_linux_options.as_ref()));
        errors.extend(
            self.constraint
                .se_linux_context
                .validate(&sc_field.child("seLinuxOptions"), se_linux),
        );

        if sc.privileged == Some(true) && !self.constraint.allow_privileged_container {
            errors.push(ValidationError::invalid(
                sc_field.child("privileged"),
                "Privileged containers are not allowed",
            ));
        }

        if !self.constraint.allow_privilege_escalation && sc.allow_privilege_escalation != Some(false) {
            errors.push(ValidationError::invalid(
                sc_field.child("allowPrivilegeEscalation"),
                "Allowing privilege escalation for containers is not allowed",
            ));
        }

        errors.extend(
            self.capabilities
                .validate(&sc_field.child("capabilities"), sc.capabilities.as_ref()),
        );

        if !self.constraint.allow_host_ports {
            let ports = container.ports.as_deref().unwrap_or_default();
            for (i, port) in ports.iter().enumerate() {
                if port.host_port.unwrap_or(0) > 0 {
                    errors.push(ValidationError::invalid(
                        field.child("ports").index(i).child("hostPort"),
                        "Host ports are not allowed to be used",
                    ));
                }
            }
        }

        if self.constraint.read_only_root_filesystem {
            let detail = match sc.read_only_root_filesystem {
                None => Some("ReadOnlyRootFilesystem may not be nil and must be set to true"),
                Some(false) => Some("ReadOnlyRootFilesystem must be set to true"),
                Some(true) => None,
            };
            if let Some(detail) = detail {
                errors.push(ValidationError::invalid(
                    sc_field.child("readOnlyRootFilesystem"),
                    detail,
                ));
            }
        }

        errors.extend(
            self.seccomp
                .validate(&sc_field.child("seccompProfile"), sc.seccomp_profile.as_ref()),
        );

        errors
    }

    /// Validates the pod-level fields and the container's own fields.
    pub fn validate_security_context(&self, pod: &Pod, container: &Container) -> ValidationErrors {
        let spec = FieldPath::new("spec");
        let mut errors = self.validate_pod_security_context(pod, &spec);
        errors.extend(self.validate_container_security_context(
            pod,
            container,
            &container_field(&spec, pod, container),
        ));
        errors
    }
}

fn pod_security_context(pod: &Pod) -> Option<&PodSecurityContext> {
    pod.spec.as_ref()?.security_context.as_ref()
}

/// Locates a container within the pod by name to name its fields.
pub(crate) fn container_field(spec: &FieldPath, pod: &Pod, container: &Container) -> FieldPath {
    let Some(pod_spec) = pod.spec.as_ref() else {
        return spec.child("containers");
    };
    if let Some(i) = pod_spec.containers.iter().position(|c| c.name == container.name) {
        return spec.child("containers").index(i);
    }
    let init = pod_spec.init_containers.as_deref().unwrap_or_default();
    match init.iter().position(|c| c.name == container.name) {
        Some(i) => spec.child("initContainers").index(i),
        None => spec.child("containers"),
    }
}
