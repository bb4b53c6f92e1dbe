use crate::{
    core::{self, allocation, VALIDATED_ANNOTATION},
    index::SharedIndex,
    k8s::{Pod, SecurityContextConstraints, SecurityContextConstraintsSpec},
    metrics::AdmissionMetrics,
};
use anyhow::{anyhow, Result};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::{core::DynamicObject, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Serves the admission webhook: pods are assigned a security context
/// constraint and constraint resources are checked before they are stored.
#[derive(Clone)]
pub struct Admission {
    index: SharedIndex,
    metrics: AdmissionMetrics,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type Review = kube::core::admission::AdmissionReview<DynamicObject>;
type AdmissionRequest = kube::core::admission::AdmissionRequest<DynamicObject>;
type AdmissionResponse = kube::core::admission::AdmissionResponse;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

trait Validate<T> {
    fn validate(&self, name: &str, spec: T) -> Result<()>;
}

type Body = http_body_util::Full<bytes::Bytes>;

// === impl AdmissionService ===

impl tower::Service<Request<hyper::body::Incoming>> for Admission {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || req.uri().path() != "/" {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        }

        let admission = self.clone();
        Box::pin(async move {
            use bytes::Buf;
            let bytes = req.into_body().collect().await?.to_bytes();
            let review: Review = match serde_json::from_reader(bytes.reader()) {
                Ok(review) => review,
                Err(error) => {
                    warn!(%error, "Failed to parse request body");
                    return json_response(AdmissionResponse::invalid(error).into_review());
                }
            };
            trace!(?review);

            let rsp = match review.try_into() {
                Ok(req) => {
                    debug!(?req);
                    admission.admit(req)
                }
                Err(error) => {
                    warn!(%error, "Invalid admission request");
                    AdmissionResponse::invalid(error)
                }
            };
            debug!(?rsp);
            json_response(rsp.into_review())
        })
    }
}

impl Admission {
    pub fn new(index: SharedIndex, metrics: AdmissionMetrics) -> Self {
        Self { index, metrics }
    }

    fn admit(&self, req: AdmissionRequest) -> AdmissionResponse {
        if is_kind::<Pod>(&req) {
            return self.admit_pod(req);
        }

        if is_kind::<SecurityContextConstraints>(&req) {
            return self.admit_spec::<SecurityContextConstraintsSpec>(req);
        }

        AdmissionResponse::invalid(format_args!(
            "unsupported resource type: {}.{}.{}",
            req.kind.group, req.kind.version, req.kind.kind
        ))
    }

    fn admit_pod(&self, req: AdmissionRequest) -> AdmissionResponse {
        use kube::core::admission::Operation;

        let rsp = AdmissionResponse::from(&req);

        // Subresources such as `status` or `binding` never change the pod's
        // security settings.
        if req.sub_resource.is_some() {
            return rsp;
        }
        let operation = match req.operation {
            Operation::Create => core::Operation::Create,
            Operation::Update => core::Operation::Update,
            _ => return rsp,
        };

        let pod = match parse_pod(&req) {
            Ok(pod) => pod,
            Err(error) => {
                info!(%error, "Failed to parse Pod");
                return rsp.deny(error);
            }
        };
        let ns = req
            .namespace
            .clone()
            .or_else(|| pod.namespace())
            .unwrap_or_default();
        let name = pod.metadata.name.clone().unwrap_or_else(|| req.name.clone());

        let providers = self.index.read().providers(&ns);
        let selection = match core::select(&providers, &pod, operation) {
            Ok(selection) => selection,
            Err(error) => {
                self.metrics.denied(operation);
                info!(%error, %ns, %name, "Denied");
                return rsp.deny(error);
            }
        };
        self.metrics.admitted(&selection.constraint, operation);
        debug!(
            %ns,
            %name,
            constraint = %selection.constraint,
            mutated = selection.mutated,
            "Admitted"
        );

        let mut admitted = selection.object;
        if operation == core::Operation::Create {
            admitted
                .annotations_mut()
                .insert(VALIDATED_ANNOTATION.to_string(), selection.constraint);
        }

        let patch = match mk_patch(&pod, &admitted) {
            Ok(patch) => patch,
            Err(error) => {
                warn!(%error, %ns, %name, "Failed to build patch");
                return rsp.deny(error);
            }
        };
        if patch.0.is_empty() {
            return rsp;
        }
        match rsp.clone().with_patch(patch) {
            Ok(rsp) => rsp,
            Err(error) => {
                warn!(%error, %ns, %name, "Failed to serialize patch");
                rsp.deny(error)
            }
        }
    }

    fn admit_spec<T>(&self, req: AdmissionRequest) -> AdmissionResponse
    where
        T: DeserializeOwned,
        Self: Validate<T>,
    {
        let rsp = AdmissionResponse::from(&req);

        let kind = req.kind.kind.clone();
        let (obj, spec) = match parse_spec::<T>(req) {
            Ok(spec) => spec,
            Err(error) => {
                info!(%error, "Failed to parse {} spec", kind);
                return rsp.deny(error);
            }
        };

        let name = obj.name_any();
        if let Err(error) = self.validate(&name, spec) {
            info!(%error, %name, %kind, "Denied");
            return rsp.deny(error);
        }

        rsp
    }
}

fn is_kind<T>(req: &AdmissionRequest) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    req.kind.group.eq_ignore_ascii_case(&T::group(&dt))
        && req.kind.kind.eq_ignore_ascii_case(&T::kind(&dt))
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}

fn parse_spec<T: DeserializeOwned>(req: AdmissionRequest) -> Result<(DynamicObject, T)> {
    let obj = req
        .object
        .ok_or_else(|| anyhow!("admission request missing 'object'"))?;

    let spec = {
        let data = obj
            .data
            .get("spec")
            .cloned()
            .ok_or_else(|| anyhow!("admission request missing 'spec'"))?;
        serde_json::from_value(data)?
    };

    Ok((obj, spec))
}

fn parse_pod(req: &AdmissionRequest) -> Result<Pod> {
    let obj = req
        .object
        .as_ref()
        .ok_or_else(|| anyhow!("admission request missing 'object'"))?;
    let pod = serde_json::from_value(serde_json::to_value(obj)?)?;
    Ok(pod)
}

/// Describes the changes made to an admitted pod as a JSON patch against the
/// submitted one.
fn mk_patch(submitted: &Pod, admitted: &Pod) -> Result<json_patch::Patch> {
    let before = serde_json::to_value(submitted)?;
    let after = serde_json::to_value(admitted)?;
    Ok(json_patch::diff(&before, &after))
}

impl Validate<SecurityContextConstraintsSpec> for Admission {
    fn validate(&self, name: &str, spec: SecurityContextConstraintsSpec) -> Result<()> {
        allocation::check(name, &spec)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;
    use kubert::index::IndexClusterResource;
    use prometheus_client::registry::Registry;
    use scc_controller_k8s_api::{ObjectMeta, RunAsUserStrategyOptions, RunAsUserStrategyType};
    use serde_json::{json, Value};

    fn mk_admission(constraints: Vec<(&str, SecurityContextConstraintsSpec)>) -> Admission {
        let index = Index::shared();
        for (name, spec) in constraints {
            index.write().apply(SecurityContextConstraints {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                spec,
            });
        }
        let metrics = AdmissionMetrics::register(&mut Registry::default());
        Admission::new(index, metrics)
    }

    fn restricted() -> SecurityContextConstraintsSpec {
        SecurityContextConstraintsSpec {
            run_as_user: RunAsUserStrategyOptions {
                type_: RunAsUserStrategyType::MustRunAs,
                uid: Some(1000),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn mk_request(kind: Value, operation: &str, object: Value) -> AdmissionRequest {
        let review: Review = serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "8b5f5e9c-0f5a-4a3e-9d43-5c2c5c3d0a01",
                "kind": kind,
                "resource": { "group": "", "version": "v1", "resource": "pods" },
                "name": "web",
                "namespace": "default",
                "operation": operation,
                "userInfo": {},
                "object": object,
            },
        }))
        .expect("review must parse");
        review.try_into().expect("review must contain a request")
    }

    fn pod_request(operation: &str, spec: Value) -> AdmissionRequest {
        mk_request(
            json!({ "group": "", "version": "v1", "kind": "Pod" }),
            operation,
            json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": { "name": "web", "namespace": "default" },
                "spec": spec,
            }),
        )
    }

    fn constraint_request(spec: Value) -> AdmissionRequest {
        mk_request(
            json!({
                "group": "security.scc.io",
                "version": "v1",
                "kind": "SecurityContextConstraints",
            }),
            "CREATE",
            json!({
                "apiVersion": "security.scc.io/v1",
                "kind": "SecurityContextConstraints",
                "metadata": { "name": "custom" },
                "spec": spec,
            }),
        )
    }

    fn patched(spec: Value, rsp: &AdmissionResponse) -> Value {
        let mut pod = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "web", "namespace": "default" },
            "spec": spec,
        });
        let patch: json_patch::Patch =
            serde_json::from_slice(rsp.patch.as_ref().expect("response must carry a patch"))
                .expect("patch must parse");
        json_patch::patch(&mut pod, &patch.0).expect("patch must apply");
        pod
    }

    #[test]
    fn admits_pod_with_generated_defaults() {
        let admission = mk_admission(vec![("restricted", restricted())]);
        let spec = json!({ "containers": [{ "name": "app", "image": "nginx" }] });

        let rsp = admission.admit(pod_request("CREATE", spec.clone()));
        assert!(rsp.allowed);

        let pod = patched(spec, &rsp);
        assert_eq!(
            pod["metadata"]["annotations"][VALIDATED_ANNOTATION],
            json!("restricted")
        );
        assert_eq!(
            pod["spec"]["containers"][0]["securityContext"]["runAsUser"],
            json!(1000)
        );
        assert_eq!(
            admission
                .metrics
                .admitted_count("restricted", core::Operation::Create),
            1
        );
    }

    #[test]
    fn denies_pod_no_constraint_admits() {
        let admission = mk_admission(vec![("restricted", restricted())]);
        let spec = json!({
            "containers": [{
                "name": "app",
                "image": "nginx",
                "securityContext": { "privileged": true },
            }],
        });

        let rsp = admission.admit(pod_request("CREATE", spec));
        assert!(!rsp.allowed);
        assert!(
            rsp.result
                .message
                .contains("Privileged containers are not allowed"),
            "unexpected message: {}",
            rsp.result.message
        );
        assert_eq!(admission.metrics.denied_count(core::Operation::Create), 1);
    }

    #[test]
    fn denies_pod_without_constraints() {
        let admission = mk_admission(vec![]);
        let spec = json!({ "containers": [{ "name": "app", "image": "nginx" }] });

        let rsp = admission.admit(pod_request("CREATE", spec));
        assert!(!rsp.allowed);
    }

    #[test]
    fn update_must_not_change_pod() {
        let admission = mk_admission(vec![("restricted", restricted())]);

        let unset = json!({ "containers": [{ "name": "app", "image": "nginx" }] });
        let rsp = admission.admit(pod_request("UPDATE", unset));
        assert!(!rsp.allowed);
        assert_eq!(admission.metrics.denied_count(core::Operation::Update), 1);

        let settled = json!({
            "containers": [{
                "name": "app",
                "image": "nginx",
                "securityContext": { "runAsUser": 1000 },
            }],
        });
        let rsp = admission.admit(pod_request("UPDATE", settled));
        assert!(rsp.allowed);
        assert!(rsp.patch.is_none());
    }

    #[test]
    fn ignores_deletes() {
        let admission = mk_admission(vec![]);
        let spec = json!({ "containers": [{ "name": "app", "image": "nginx" }] });

        let rsp = admission.admit(pod_request("DELETE", spec));
        assert!(rsp.allowed);
    }

    #[test]
    fn validates_constraints() {
        let admission = mk_admission(vec![]);

        let rsp = admission.admit(constraint_request(json!({
            "runAsUser": { "type": "MustRunAs", "uid": 1000 },
        })));
        assert!(rsp.allowed);

        let rsp = admission.admit(constraint_request(json!({
            "defaultAddCapabilities": ["NET_ADMIN"],
            "requiredDropCapabilities": ["NET_ADMIN"],
        })));
        assert!(!rsp.allowed);
        assert!(rsp.result.message.contains("NET_ADMIN"));

        let rsp = admission.admit(constraint_request(json!({
            "runAsUser": { "type": "MustRunAs" },
        })));
        assert!(!rsp.allowed);

        let rsp = admission.admit(constraint_request(json!({
            "allowPrivilegeEscalation": false,
            "defaultAllowPrivilegeEscalation": true,
        })));
        assert!(!rsp.allowed);
        assert_eq!(
            rsp.result.message,
            "privilege escalation is allowed by default but not permitted"
        );
    }

    #[test]
    fn denies_requests_without_objects() {
        let admission = mk_admission(vec![("restricted", restricted())]);
        for kind in [
            json!({ "group": "", "version": "v1", "kind": "Pod" }),
            json!({
                "group": "security.scc.io",
                "version": "v1",
                "kind": "SecurityContextConstraints",
            }),
        ] {
            let rsp = admission.admit(mk_request(kind, "CREATE", Value::Null));
            assert!(!rsp.allowed);
            assert_eq!(rsp.result.message, "admission request missing 'object'");
        }
    }

    #[test]
    fn required_constraint_is_honored() {
        let admission = mk_admission(vec![
            ("anyuid", SecurityContextConstraintsSpec::default()),
            ("restricted", restricted()),
        ]);
        let pod = |required: &str| {
            json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {
                    "name": "web",
                    "namespace": "default",
                    "annotations": { (core::REQUIRED_ANNOTATION): required },
                },
                "spec": { "containers": [{ "name": "app", "image": "nginx" }] },
            })
        };
        let kind = || json!({ "group": "", "version": "v1", "kind": "Pod" });

        let rsp = admission.admit(mk_request(kind(), "CREATE", pod("restricted")));
        assert!(rsp.allowed);
        assert_eq!(
            admission
                .metrics
                .admitted_count("restricted", core::Operation::Create),
            1
        );

        let rsp = admission.admit(mk_request(kind(), "CREATE", pod("privileged")));
        assert!(!rsp.allowed);
        assert_eq!(
            rsp.result.message,
            "required security context constraint \"privileged\" is not available"
        );
    }

    #[test]
    fn rejects_unsupported_kinds() {
        let admission = mk_admission(vec![]);
        let rsp = admission.admit(mk_request(
            json!({ "group": "apps", "version": "v1", "kind": "Deployment" }),
            "CREATE",
            json!({ "apiVersion": "apps/v1", "kind": "Deployment", "metadata": { "name": "web" } }),
        ));
        assert!(!rsp.allowed);
    }
}
