use super::*;
use kubert::index::IndexClusterResource;
use maplit::btreemap;
use pretty_assertions::assert_eq;
use scc_controller_core::allocation::{MCS_ANNOTATION, UID_RANGE_ANNOTATION};
use scc_controller_k8s_api::{
    Namespace, ObjectMeta, RunAsUserStrategyOptions, RunAsUserStrategyType,
    SecurityContextConstraints,
};

fn mk_constraint(name: &str, spec: SecurityContextConstraintsSpec) -> SecurityContextConstraints {
    SecurityContextConstraints {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec,
    }
}

fn mk_namespace(name: &str, annotations: BTreeMap<String, String>) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations: Some(annotations),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn pre_allocated() -> SecurityContextConstraintsSpec {
    SecurityContextConstraintsSpec {
        run_as_user: RunAsUserStrategyOptions {
            type_: RunAsUserStrategyType::MustRunAsRange,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn names(providers: &[Provider]) -> Vec<&str> {
    providers.iter().map(Provider::name).collect()
}

#[test]
fn providers_are_ordered() {
    let mut index = Index::default();
    index.apply(mk_constraint("b", SecurityContextConstraintsSpec::default()));
    index.apply(mk_constraint(
        "privileged",
        SecurityContextConstraintsSpec {
            allow_privileged_container: true,
            ..Default::default()
        },
    ));
    index.apply(mk_constraint("a", SecurityContextConstraintsSpec::default()));
    index.apply(mk_constraint(
        "z-high",
        SecurityContextConstraintsSpec {
            priority: Some(10),
            ..Default::default()
        },
    ));

    assert_eq!(
        names(&index.providers("default")),
        ["z-high", "a", "b", "privileged"]
    );
}

#[test]
fn pre_allocated_constraints_follow_namespaces() {
    let mut index = Index::default();
    index.apply(mk_constraint("restricted", pre_allocated()));
    index.apply(mk_constraint("any", SecurityContextConstraintsSpec::default()));
    index.apply(mk_namespace(
        "allocated",
        btreemap! {
            UID_RANGE_ANNOTATION.to_string() => "1000/10".to_string(),
            MCS_ANNOTATION.to_string() => "s0:c1,c0".to_string(),
            "unrelated".to_string() => "value".to_string(),
        },
    ));
    index.apply(mk_namespace("bare", BTreeMap::new()));

    let providers = index.providers("allocated");
    assert_eq!(names(&providers), ["restricted", "any"]);
    assert_eq!(
        providers[0].constraint().run_as_user,
        scc_controller_core::RunAsUserStrategy::MustRunAsRange {
            min: 1000,
            max: 1009
        }
    );
    assert_eq!(index.namespaces["allocated"].len(), 2);

    assert_eq!(names(&index.providers("bare")), ["any"]);
    assert_eq!(names(&index.providers("unknown")), ["any"]);
}

#[test]
fn invalid_constraints_are_skipped() {
    let mut index = Index::default();
    index.apply(mk_constraint(
        "conflict",
        SecurityContextConstraintsSpec {
            default_add_capabilities: vec!["NET_ADMIN".into()],
            required_drop_capabilities: vec!["NET_ADMIN".into()],
            ..Default::default()
        },
    ));
    index.apply(mk_constraint("valid", SecurityContextConstraintsSpec::default()));

    assert_eq!(names(&index.providers("default")), ["valid"]);
}

#[test]
fn deletes() {
    let mut index = Index::default();
    index.apply(mk_constraint("restricted", pre_allocated()));
    index.apply(mk_namespace(
        "ns",
        btreemap! { UID_RANGE_ANNOTATION.to_string() => "1/5".to_string() },
    ));
    assert_eq!(names(&index.providers("ns")), ["restricted"]);

    IndexClusterResource::<Namespace>::delete(&mut index, "ns".into());
    assert!(index.providers("ns").is_empty());
    assert_eq!(index.num_namespaces(), 0);

    IndexClusterResource::<SecurityContextConstraints>::delete(&mut index, "restricted".into());
    assert_eq!(index.num_constraints(), 0);
}
