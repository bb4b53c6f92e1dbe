use crate::{FieldPath, SeLinuxStrategy, ValidationError, ValidationErrors};
use scc_controller_k8s_api::SELinuxOptions;
use std::collections::BTreeSet;

/// The highest MCS category number.
const MAX_CATEGORY: u32 = 1023;

/// A parsed multi-category-security level, such as `s0:c1,c5` or
/// `s0-s1:c0.c10`.
///
/// Categories are kept as a set so that levels naming the same categories in
/// a different order (or as a range) compare equal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Level {
    sensitivity: String,
    categories: BTreeSet<u32>,
}

impl SeLinuxStrategy {
    pub fn generate(&self) -> Option<SELinuxOptions> {
        match self {
            Self::RunAsAny => None,
            Self::MustRunAs(options) => Some(options.clone()),
        }
    }

    /// Checks that every label the policy sets is matched by `options`.
    pub fn validate(&self, field: &FieldPath, options: Option<&SELinuxOptions>) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        let (Self::MustRunAs(required), Some(options)) = (self, options) else {
            return errors;
        };

        let exact = [
            ("user", &required.user, &options.user),
            ("role", &required.role, &options.role),
            ("type", &required.type_, &options.type_),
        ];
        for (name, required, actual) in exact {
            let Some(required) = required else { continue };
            if actual.as_deref() != Some(required.as_str()) {
                errors.push(mismatch(field, name, required, actual.as_deref()));
            }
        }

        if let Some(required) = &required.level {
            let matches = options
                .level
                .as_deref()
                .map(|actual| levels_match(required, actual))
                .unwrap_or(false);
            if !matches {
                errors.push(mismatch(field, "level", required, options.level.as_deref()));
            }
        }

        errors
    }
}

fn mismatch(field: &FieldPath, name: &str, required: &str, actual: Option<&str>) -> ValidationError {
    let actual = match actual {
        Some(actual) => format!("{actual:?}"),
        None => "unset value".to_string(),
    };
    ValidationError::invalid(
        field.child(name),
        format!("{actual} does not match required {name} {required:?}"),
    )
}

/// Compares two levels by meaning rather than spelling. Levels that do not
/// parse only match themselves.
pub fn levels_match(a: &str, b: &str) -> bool {
    match (Level::parse(a), Level::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

// === impl Level ===

impl Level {
    pub fn parse(s: &str) -> Result<Self, &'static str> {
        let (sensitivity, categories) = match s.split_once(':') {
            Some((sensitivity, categories)) => (sensitivity, Some(categories)),
            None => (s, None),
        };

        match sensitivity.split_once('-') {
            Some((low, high)) => {
                if parse_sensitivity(low)? > parse_sensitivity(high)? {
                    return Err("sensitivity range is empty");
                }
            }
            None => {
                parse_sensitivity(sensitivity)?;
            }
        }

        let mut set = BTreeSet::new();
        for token in categories.into_iter().flat_map(|c| c.split(',')) {
            match token.split_once('.') {
                Some((low, high)) => {
                    let (low, high) = (parse_category(low)?, parse_category(high)?);
                    if low > high {
                        return Err("category range is empty");
                    }
                    set.extend(low..=high);
                }
                None => {
                    set.insert(parse_category(token)?);
                }
            }
        }

        Ok(Self {
            sensitivity: sensitivity.to_string(),
            categories: set,
        })
    }
}

fn parse_sensitivity(s: &str) -> Result<u32, &'static str> {
    parse_number(s, 's').ok_or("malformed sensitivity")
}

fn parse_category(s: &str) -> Result<u32, &'static str> {
    let n = parse_number(s, 'c').ok_or("malformed category")?;
    if n > MAX_CATEGORY {
        return Err("category out of range");
    }
    Ok(n)
}

fn parse_number(s: &str, prefix: char) -> Option<u32> {
    let digits = s.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
