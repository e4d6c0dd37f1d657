//! Network convergence engine for challenges
//!
//! Brings the cluster's internal service, load-balancer service, and
//! ingress in line with the Challenge spec using the minimal
//! create/update/delete per resource kind. The decision itself is a pure
//! function over (observed, desired, should-exist), so the state machine
//! can be exercised without a cluster; the async wrappers only do the
//! fetch and the single mutating call.

use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use super::{compare, ports, services};
use crate::crd::Challenge;
use crate::error::{Error, Result};

/// ConfigMap consulted for the ingress domain name
pub const OPERATOR_CONFIG_MAP: &str = "challenge-operator-config";
/// Key inside [`OPERATOR_CONFIG_MAP`] holding the domain
pub const DOMAIN_NAME_KEY: &str = "domain-name";

/// The single mutating step (or no-op) chosen for one resource kind
#[derive(Clone, Debug, PartialEq)]
pub enum ConvergeAction<T> {
    /// Observed state already matches, or the resource rightly does not exist
    Unchanged,
    /// The resource should exist and does not
    Create(T),
    /// The resource exists but its managed fields differ; carries the
    /// merged object (observed server-managed fields, desired managed ones)
    Update(T),
    /// The resource exists but should not
    Delete,
}

impl<T> ConvergeAction<T> {
    /// Whether executing this action issues a mutating cluster call
    pub fn changes_cluster(&self) -> bool {
        !matches!(self, ConvergeAction::Unchanged)
    }
}

fn plan<T: Clone>(
    observed: Option<&T>,
    desired: T,
    should_exist: bool,
    equal: fn(&T, &T) -> bool,
    merge: fn(&T, &T) -> T,
) -> ConvergeAction<T> {
    match observed {
        None if should_exist => ConvergeAction::Create(desired),
        None => ConvergeAction::Unchanged,
        Some(_) if !should_exist => ConvergeAction::Delete,
        Some(found) if equal(found, &desired) => ConvergeAction::Unchanged,
        Some(found) => ConvergeAction::Update(merge(found, &desired)),
    }
}

/// Convergence decision for a Service
pub fn plan_service(
    observed: Option<&Service>,
    desired: Service,
    should_exist: bool,
) -> ConvergeAction<Service> {
    plan(
        observed,
        desired,
        should_exist,
        compare::services_equal,
        merge_service,
    )
}

/// Convergence decision for an Ingress
pub fn plan_ingress(
    observed: Option<&Ingress>,
    desired: Ingress,
    should_exist: bool,
) -> ConvergeAction<Ingress> {
    plan(
        observed,
        desired,
        should_exist,
        compare::ingresses_equal,
        merge_ingress,
    )
}

/// New service value: the observed object (keeping cluster IP, node ports,
/// resource version) with the desired ports and annotations on top.
fn merge_service(observed: &Service, desired: &Service) -> Service {
    let mut merged = observed.clone();
    match merged.spec.as_mut() {
        Some(spec) => spec.ports = desired.spec.as_ref().and_then(|s| s.ports.clone()),
        None => merged.spec = desired.spec.clone(),
    }
    merged.metadata.annotations = desired.metadata.annotations.clone();
    merged
}

/// New ingress value: the observed object with the desired backend, rules,
/// and annotations on top.
fn merge_ingress(observed: &Ingress, desired: &Ingress) -> Ingress {
    let mut merged = observed.clone();
    match merged.spec.as_mut() {
        Some(spec) => {
            let wanted = desired.spec.as_ref();
            spec.default_backend = wanted.and_then(|s| s.default_backend.clone());
            spec.rules = wanted.and_then(|s| s.rules.clone());
        }
        None => merged.spec = desired.spec.clone(),
    }
    merged.metadata.annotations = desired.metadata.annotations.clone();
    merged
}

/// Fetch one object by name, with "not found" as a valid state
async fn fetch<K>(
    api: &Api<K>,
    kind: &'static str,
    namespace: &str,
    name: &str,
) -> Result<Option<K>>
where
    K: Clone + DeserializeOwned + std::fmt::Debug,
{
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
        Err(e) => Err(Error::ClusterReadFailure {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            source: e,
        }),
    }
}

/// Execute a convergence action, attaching ownership on create.
/// Returns whether a mutating call was issued.
async fn execute<K>(
    api: &Api<K>,
    challenge: &Challenge,
    kind: &'static str,
    namespace: &str,
    name: &str,
    action: ConvergeAction<K>,
) -> Result<bool>
where
    K: kube::Resource + Clone + std::fmt::Debug + Serialize + DeserializeOwned,
{
    let write_failure = |verb: &'static str| {
        let namespace = namespace.to_string();
        let name = name.to_string();
        move |source: kube::Error| Error::ClusterWriteFailure {
            verb,
            kind,
            namespace,
            name,
            source,
        }
    };

    match action {
        ConvergeAction::Unchanged => Ok(false),
        ConvergeAction::Create(mut desired) => {
            desired.meta_mut().owner_references =
                Some(vec![services::owner_reference(challenge)]);
            api.create(&PostParams::default(), &desired)
                .await
                .map_err(write_failure("create"))?;
            Ok(true)
        }
        ConvergeAction::Update(merged) => {
            api.replace(name, &PostParams::default(), &merged)
                .await
                .map_err(write_failure("update"))?;
            Ok(true)
        }
        ConvergeAction::Delete => {
            api.delete(name, &DeleteParams::default())
                .await
                .map_err(write_failure("delete"))?;
            Ok(true)
        }
    }
}

/// Converge the cluster-internal service; it must always exist.
#[instrument(skip(client, challenge), fields(name = %challenge.name_any(), namespace = challenge.namespace()))]
async fn converge_internal_service(client: &Client, challenge: &Challenge) -> Result<bool> {
    let namespace = challenge.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Service> = Api::namespaced(client.clone(), &namespace);
    let name = services::internal_service_name(&challenge.name_any());

    let desired = services::build_internal_service(challenge);
    let observed = fetch(&api, "Service", &namespace, &name).await?;
    let action = plan_service(observed.as_ref(), desired, true);

    let changed = execute(&api, challenge, "Service", &namespace, &name, action).await?;
    if changed {
        info!("Converged internal service {}/{}", namespace, name);
    }
    Ok(changed)
}

/// Converge the load-balancer service; exists only for public challenges
/// with externally exposable ports.
#[instrument(skip(client, challenge), fields(name = %challenge.name_any(), namespace = challenge.namespace()))]
async fn converge_load_balancer_service(client: &Client, challenge: &Challenge) -> Result<bool> {
    let namespace = challenge.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Service> = Api::namespaced(client.clone(), &namespace);
    let name = services::load_balancer_service_name(&challenge.name_any());

    let desired = services::build_load_balancer_service(challenge);
    let should_exist = services::load_balancer_should_exist(challenge, &desired);
    let observed = fetch(&api, "Service", &namespace, &name).await?;
    let action = plan_service(observed.as_ref(), desired, should_exist);

    let changed = execute(&api, challenge, "Service", &namespace, &name, action).await?;
    if changed {
        info!("Converged load balancer service {}/{}", namespace, name);
    }
    Ok(changed)
}

/// Converge the ingress; exists only for public challenges with a backend.
#[instrument(skip(client, challenge), fields(name = %challenge.name_any(), namespace = challenge.namespace()))]
async fn converge_ingress(client: &Client, challenge: &Challenge) -> Result<bool> {
    let namespace = challenge.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Ingress> = Api::namespaced(client.clone(), &namespace);
    let name = challenge.name_any();

    let domain = resolve_domain_name(client, challenge).await;
    let desired = services::build_ingress(domain.as_deref(), challenge);
    let should_exist = services::ingress_should_exist(challenge, &desired);
    let observed = fetch(&api, "Ingress", &namespace, &name).await?;
    let action = plan_ingress(observed.as_ref(), desired, should_exist);

    let changed = execute(&api, challenge, "Ingress", &namespace, &name, action).await?;
    if changed {
        info!("Converged ingress {}/{}", namespace, name);
    }
    Ok(changed)
}

/// Domain used for ingress hostnames, read from the operator ConfigMap in
/// the challenge's namespace. A missing map, missing key, or read failure
/// all mean "no domain", which leaves the ingress without a backend.
pub async fn resolve_domain_name(client: &Client, challenge: &Challenge) -> Option<String> {
    let namespace = challenge.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace);

    match api.get(OPERATOR_CONFIG_MAP).await {
        Ok(cm) => cm
            .data
            .and_then(|data| data.get(DOMAIN_NAME_KEY).cloned())
            .filter(|domain| !domain.is_empty()),
        Err(kube::Error::Api(e)) if e.code == 404 => None,
        Err(e) => {
            warn!(
                "Failed to read ConfigMap {}/{}: {:?}",
                namespace, OPERATOR_CONFIG_MAP, e
            );
            None
        }
    }
}

/// Converge the challenge's network exposure.
///
/// Validates the port table, then converges the internal service, the
/// load-balancer service, and the ingress in that fixed order. Returns
/// whether any cluster object changed. The first error aborts the
/// remaining kinds; changes already applied stay in place and the next
/// pass finishes the rest.
pub async fn update_network(client: &Client, challenge: &Challenge) -> Result<bool> {
    let namespace = challenge.namespace().unwrap_or_else(|| "default".to_string());
    let name = challenge.name_any();

    ports::validate_ports(&challenge.spec.ports).map_err(|err| {
        error!(
            "Invalid port configuration for {}/{}: {}",
            namespace, name, err
        );
        err
    })?;

    let mut changed = false;

    changed |= converge_internal_service(client, challenge)
        .await
        .map_err(|err| {
            error!(
                "Error converging internal service for {}/{}: {}",
                namespace, name, err
            );
            err
        })?;

    changed |= converge_load_balancer_service(client, challenge)
        .await
        .map_err(|err| {
            error!(
                "Error converging load balancer service for {}/{}: {}",
                namespace, name, err
            );
            err
        })?;

    changed |= converge_ingress(client, challenge).await.map_err(|err| {
        error!("Error converging ingress for {}/{}: {}", namespace, name, err);
        err
    })?;

    Ok(changed)
}
