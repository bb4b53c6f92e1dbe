use crate::{FieldPath, Provider, ValidationError, ValidationErrors, REQUIRED_ANNOTATION};
use scc_controller_k8s_api::{Container, Pod};
use std::{collections::BTreeMap, fmt};
use tracing::debug;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    /// The pod already exists, so only a constraint that admits it without
    /// changes may be chosen.
    Update,
}

/// The outcome of a successful search.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection<T> {
    /// The name of the constraint that admitted the object.
    pub constraint: String,
    /// The object with generated fields filled in.
    pub object: T,
    /// True if generation changed the object.
    pub mutated: bool,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SelectError {
    #[error("no security context constraints are available to validate against")]
    NoProviders,

    #[error("required security context constraint {0:?} is not available")]
    RequiredUnavailable(String),

    #[error(
        "unable to validate against any security context constraint: {}",
        DisplayRejections(.0)
    )]
    Rejected(BTreeMap<String, ValidationErrors>),
}

struct DisplayRejections<'a>(&'a BTreeMap<String, ValidationErrors>);

/// Finds the first provider, in the given order, under which the pod is
/// admitted. Each provider works on its own copy of the pod, so rejected
/// candidates leave no trace.
///
/// A pod annotated with [`REQUIRED_ANNOTATION`] is only evaluated against the
/// constraint it names.
pub fn select<'p>(
    providers: impl IntoIterator<Item = &'p Provider>,
    pod: &Pod,
    operation: Operation,
) -> Result<Selection<Pod>, SelectError> {
    let providers = candidates(providers, pod)?;
    search(providers, pod, operation, assign_pod)
}

/// Finds the first provider under which a single container of the pod is
/// admitted.
pub fn select_container<'p>(
    providers: impl IntoIterator<Item = &'p Provider>,
    pod: &Pod,
    container: &Container,
) -> Result<Selection<Container>, SelectError> {
    let providers = candidates(providers, pod)?;
    search(providers, container, Operation::Create, |provider, container| {
        let mut candidate = container.clone();
        let sc = provider.create_container_security_context(pod, &candidate);
        candidate.security_context = non_empty(sc, candidate.security_context.is_some());
        let errors = provider.validate_security_context(pod, &candidate);
        (candidate, errors)
    })
}

fn candidates<'p>(
    providers: impl IntoIterator<Item = &'p Provider>,
    pod: &Pod,
) -> Result<Vec<&'p Provider>, SelectError> {
    let providers = providers.into_iter();
    let required = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(REQUIRED_ANNOTATION))
        .filter(|name| !name.is_empty());
    let Some(required) = required else {
        return Ok(providers.collect());
    };

    let providers = providers
        .filter(|p| p.name() == required)
        .collect::<Vec<_>>();
    if providers.is_empty() {
        return Err(SelectError::RequiredUnavailable(required.clone()));
    }
    Ok(providers)
}

fn search<'p, T, F>(
    providers: impl IntoIterator<Item = &'p Provider>,
    original: &T,
    operation: Operation,
    mut admit: F,
) -> Result<Selection<T>, SelectError>
where
    T: PartialEq,
    F: FnMut(&Provider, &T) -> (T, ValidationErrors),
{
    let mut rejected = BTreeMap::new();
    let mut evaluated = false;

    for provider in providers {
        evaluated = true;
        let (candidate, mut errors) = admit(provider, original);
        let mutated = candidate != *original;
        if errors.is_empty() && mutated && operation == Operation::Update {
            errors.push(ValidationError::forbidden(
                FieldPath::new("spec"),
                "admitting an existing pod may not change its security context",
            ));
        }

        if !errors.is_empty() {
            debug!(constraint = %provider.name(), %errors, "Rejected");
            rejected.insert(provider.name().to_string(), errors);
            continue;
        }

        debug!(constraint = %provider.name(), mutated, "Admitted");
        return Ok(Selection {
            constraint: provider.name().to_string(),
            object: candidate,
            mutated,
        });
    }

    if !evaluated {
        return Err(SelectError::NoProviders);
    }
    Err(SelectError::Rejected(rejected))
}

fn assign_pod(provider: &Provider, pod: &Pod) -> (Pod, ValidationErrors) {
    let mut candidate = pod.clone();
    let spec_field = FieldPath::new("spec");

    let psc = provider.create_pod_security_context(&candidate);
    if let Some(spec) = candidate.spec.as_mut() {
        spec.security_context = non_empty(psc, spec.security_context.is_some());
    }
    let mut errors = provider.validate_pod_security_context(&candidate, &spec_field);

    // Container contexts are generated against the pod's generated context.
    let Some(spec) = candidate.spec.as_ref() else {
        return (candidate, errors);
    };
    let init = spec
        .init_containers
        .iter()
        .flatten()
        .map(|c| provider.create_container_security_context(&candidate, c))
        .collect::<Vec<_>>();
    let regular = spec
        .containers
        .iter()
        .map(|c| provider.create_container_security_context(&candidate, c))
        .collect::<Vec<_>>();

    if let Some(spec) = candidate.spec.as_mut() {
        for (c, sc) in spec.init_containers.iter_mut().flatten().zip(init) {
            c.security_context = non_empty(sc, c.security_context.is_some());
        }
        for (c, sc) in spec.containers.iter_mut().zip(regular) {
            c.security_context = non_empty(sc, c.security_context.is_some());
        }
    }

    if let Some(spec) = candidate.spec.as_ref() {
        for (i, c) in spec.init_containers.iter().flatten().enumerate() {
            let field = spec_field.child("initContainers").index(i);
            errors.extend(provider.validate_container_security_context(&candidate, c, &field));
        }
        for (i, c) in spec.containers.iter().enumerate() {
            let field = spec_field.child("containers").index(i);
            errors.extend(provider.validate_container_security_context(&candidate, c, &field));
        }
    }

    (candidate, errors)
}

/// Keeps an unset security context unset when nothing was generated for it.
fn non_empty<T: Default + PartialEq>(sc: T, was_set: bool) -> Option<T> {
    if was_set || sc != T::default() {
        return Some(sc);
    }
    None
}

// === impl DisplayRejections ===

impl fmt::Display for DisplayRejections<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (name, errors)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "provider {name:?}: {errors}")?;
        }
        f.write_str("]")
    }
}
