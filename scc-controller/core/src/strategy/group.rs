use crate::{ConfigError, FieldPath, GroupStrategy, IdRange, ValidationError, ValidationErrors};

impl GroupStrategy {
    pub(crate) fn check(&self, strategy: &'static str) -> Result<(), ConfigError> {
        let Self::MustRunAs(ranges) = self else {
            return Ok(());
        };
        if ranges.is_empty() {
            return Err(ConfigError::MissingRanges { strategy });
        }
        if let Some(&IdRange { min, max }) = ranges.iter().find(|r| r.min > r.max) {
            return Err(ConfigError::EmptyRange { strategy, min, max });
        }
        Ok(())
    }

    /// The single group ID used for the FS group: the lowest ID of the first
    /// range.
    pub fn generate_single(&self) -> Option<i64> {
        match self {
            Self::RunAsAny => None,
            Self::MustRunAs(ranges) => ranges.first().map(|r| r.min),
        }
    }

    /// The supplemental groups to add when none are requested.
    pub fn generate(&self) -> Option<Vec<i64>> {
        self.generate_single().map(|gid| vec![gid])
    }

    pub fn validate(&self, field: &FieldPath, groups: &[i64]) -> ValidationErrors {
        let Self::MustRunAs(ranges) = self else {
            return ValidationErrors::default();
        };
        groups
            .iter()
            .filter(|&&gid| !ranges.iter().any(|r| r.contains(gid)))
            .map(|gid| {
                ValidationError::invalid(field.clone(), format!("{gid} is not an allowed group"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ranges(ranges: &[(i64, i64)]) -> GroupStrategy {
        GroupStrategy::MustRunAs(
            ranges
                .iter()
                .map(|&(min, max)| IdRange { min, max })
                .collect(),
        )
    }

    #[test]
    fn generates_first_range_minimum() {
        let strategy = ranges(&[(3, 9), (1, 2)]);
        assert_eq!(strategy.generate_single(), Some(3));
        assert_eq!(strategy.generate(), Some(vec![3]));
        assert_eq!(GroupStrategy::RunAsAny.generate(), None);
    }

    #[rstest]
    #[case(&[], true)]
    #[case(&[1], true)]
    #[case(&[1, 5, 12], true)]
    #[case(&[6], false)]
    #[case(&[1, 6, 13], false)]
    fn validates_membership(#[case] groups: &[i64], #[case] ok: bool) {
        let strategy = ranges(&[(1, 5), (10, 15)]);
        let errors = strategy.validate(&FieldPath::new("fsGroup"), groups);
        assert_eq!(errors.is_empty(), ok, "{errors}");
    }

    #[test]
    fn reports_each_disallowed_group() {
        let strategy = ranges(&[(1, 5)]);
        let errors = strategy.validate(&FieldPath::new("supplementalGroups"), &[0, 3, 7]);
        let details = errors.iter().map(|e| e.detail.as_str()).collect::<Vec<_>>();
        assert_eq!(details, ["0 is not an allowed group", "7 is not an allowed group"]);
    }

    #[test]
    fn run_as_any_allows_anything() {
        assert!(GroupStrategy::RunAsAny
            .validate(&FieldPath::new("fsGroup"), &[0, i64::MAX])
            .is_empty());
    }

    #[test]
    fn malformed_configuration() {
        assert_eq!(
            ranges(&[]).check("fsGroup"),
            Err(ConfigError::MissingRanges {
                strategy: "fsGroup"
            })
        );
        assert_eq!(
            ranges(&[(1, 2), (9, 3)]).check("supplementalGroups"),
            Err(ConfigError::EmptyRange {
                strategy: "supplementalGroups",
                min: 9,
                max: 3
            })
        );
        assert!(GroupStrategy::RunAsAny.check("fsGroup").is_ok());
    }
}
