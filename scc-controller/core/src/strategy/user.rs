use crate::{ConfigError, FieldPath, RunAsUserStrategy, ValidationError, ValidationErrors};

impl RunAsUserStrategy {
    pub(crate) fn check(&self) -> Result<(), ConfigError> {
        if let Self::MustRunAsRange { min, max } = *self {
            if min > max {
                return Err(ConfigError::EmptyRange {
                    strategy: "runAsUser",
                    min,
                    max,
                });
            }
        }
        Ok(())
    }

    /// The UID to run as when none is requested.
    pub fn generate(&self) -> Option<i64> {
        match *self {
            Self::MustRunAs { uid } => Some(uid),
            Self::MustRunAsRange { min, .. } => Some(min),
            Self::RunAsAny | Self::MustRunAsNonRoot => None,
        }
    }

    pub fn validate(&self, field: &FieldPath, uid: Option<i64>) -> ValidationErrors {
        let Some(uid) = uid else {
            return ValidationErrors::default();
        };

        let detail = match *self {
            Self::RunAsAny => None,
            Self::MustRunAs { uid: required } => {
                (uid != required).then(|| format!("{uid} does not match required UID {required}"))
            }
            Self::MustRunAsRange { min, max } => (uid < min || uid > max)
                .then(|| format!("UID {uid} is outside allowed range {min}-{max}")),
            Self::MustRunAsNonRoot => {
                (uid == 0).then(|| "running with the root UID is forbidden".to_string())
            }
        };

        detail
            .map(|d| ValidationError::invalid(field.clone(), d))
            .into_iter()
            .collect()
    }
}
