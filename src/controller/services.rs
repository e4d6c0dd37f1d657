//! Service and Ingress builders for challenge network exposure
//!
//! All builders are pure: they derive the desired object from the
//! Challenge spec alone and are recomputed fresh on every reconcile pass.
//! The exposure-policy predicates decide whether the externally visible
//! resources should exist at all; they are evaluated before any state
//! comparison so a resource that should not exist routes straight to
//! deletion.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use crate::crd::{Challenge, PortProtocol, PortSpec};

/// Get the standard labels for a challenge's resources
pub fn standard_labels(challenge: &Challenge) -> BTreeMap<String, String> {
    let mut labels = selector_labels(challenge);
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "challenge-operator".to_string(),
    );
    labels
}

/// Labels selecting the challenge's pods
pub fn selector_labels(challenge: &Challenge) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "app.kubernetes.io/name".to_string(),
            "challenge".to_string(),
        ),
        ("app.kubernetes.io/instance".to_string(), challenge.name_any()),
    ])
}

/// Create an OwnerReference for garbage collection; attached on create only
pub fn owner_reference(challenge: &Challenge) -> OwnerReference {
    OwnerReference {
        api_version: Challenge::api_version(&()).to_string(),
        kind: Challenge::kind(&()).to_string(),
        name: challenge.name_any(),
        uid: challenge.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Name of the cluster-internal service for a challenge
pub fn internal_service_name(challenge_name: &str) -> String {
    challenge_name.to_string()
}

/// Name of the externally reachable load-balancer service
pub fn load_balancer_service_name(challenge_name: &str) -> String {
    format!("{challenge_name}-lb-service")
}

/// The HTTPS mapping, if the challenge declares one
pub fn https_port(ports: &[PortSpec]) -> Option<&PortSpec> {
    ports.iter().find(|p| p.protocol == PortProtocol::Https)
}

fn object_meta(challenge: &Challenge, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: challenge.namespace(),
        labels: Some(standard_labels(challenge)),
        ..Default::default()
    }
}

/// Cluster-internal service exposing every mapping's target port
pub fn build_internal_service(challenge: &Challenge) -> Service {
    let mut service_ports: Vec<ServicePort> = Vec::new();
    for port in &challenge.spec.ports {
        let name = format!(
            "port-{}-{}",
            port.protocol.as_k8s().to_lowercase(),
            port.target_port
        );
        // Two mappings may share a target; expose it once
        if service_ports.iter().any(|p| p.name.as_deref() == Some(&name)) {
            continue;
        }
        service_ports.push(ServicePort {
            name: Some(name),
            protocol: Some(port.protocol.as_k8s().to_string()),
            port: port.target_port,
            target_port: Some(IntOrString::Int(port.target_port)),
            ..Default::default()
        });
    }

    Service {
        metadata: object_meta(
            challenge,
            internal_service_name(&challenge.name_any()),
        ),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(challenge)),
            ports: Some(service_ports),
            ..Default::default()
        }),
        status: None,
    }
}

/// Externally reachable service carrying the non-HTTPS mappings.
/// HTTPS traffic enters through the ingress instead, so an HTTPS-only
/// challenge yields an empty port list here.
pub fn build_load_balancer_service(challenge: &Challenge) -> Service {
    let mut service_ports: Vec<ServicePort> = Vec::new();
    for port in challenge
        .spec
        .ports
        .iter()
        .filter(|p| p.protocol != PortProtocol::Https)
    {
        let name = format!("port-{}", port.resolved_port());
        if service_ports.iter().any(|p| p.name.as_deref() == Some(&name)) {
            continue;
        }
        service_ports.push(ServicePort {
            name: Some(name),
            protocol: Some(port.protocol.as_k8s().to_string()),
            port: port.resolved_port(),
            target_port: Some(IntOrString::Int(port.target_port)),
            ..Default::default()
        });
    }

    Service {
        metadata: object_meta(
            challenge,
            load_balancer_service_name(&challenge.name_any()),
        ),
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            selector: Some(selector_labels(challenge)),
            ports: Some(service_ports),
            ..Default::default()
        }),
        status: None,
    }
}

/// Ingress routing the HTTPS mapping through `<name>.<domain>`.
///
/// Without a resolvable domain or an HTTPS mapping the backend stays
/// empty, which the exposure policy treats as "should not exist".
pub fn build_ingress(domain: Option<&str>, challenge: &Challenge) -> Ingress {
    let backend = match (domain, https_port(&challenge.spec.ports)) {
        (Some(_), Some(mapping)) => Some(IngressBackend {
            service: Some(IngressServiceBackend {
                name: internal_service_name(&challenge.name_any()),
                port: Some(ServiceBackendPort {
                    number: Some(mapping.target_port),
                    name: None,
                }),
            }),
            resource: None,
        }),
        _ => None,
    };

    let rules = match (domain, &backend) {
        (Some(domain), Some(backend)) => Some(vec![IngressRule {
            host: Some(format!("{}.{}", challenge.name_any(), domain)),
            http: Some(HTTPIngressRuleValue {
                paths: vec![HTTPIngressPath {
                    path: Some("/".to_string()),
                    path_type: "Prefix".to_string(),
                    backend: backend.clone(),
                }],
            }),
        }]),
        _ => None,
    };

    Ingress {
        metadata: object_meta(challenge, challenge.name_any()),
        spec: Some(IngressSpec {
            default_backend: backend,
            rules,
            ..Default::default()
        }),
        status: None,
    }
}

/// Whether the load-balancer service should exist: the challenge must be
/// public and the desired service must actually carry ports.
pub fn load_balancer_should_exist(challenge: &Challenge, desired: &Service) -> bool {
    challenge.spec.public
        && desired
            .spec
            .as_ref()
            .and_then(|s| s.ports.as_ref())
            .is_some_and(|ports| !ports.is_empty())
}

/// Whether the ingress should exist: the challenge must be public and the
/// desired ingress must have a backend to route to.
pub fn ingress_should_exist(challenge: &Challenge, desired: &Ingress) -> bool {
    challenge.spec.public
        && desired
            .spec
            .as_ref()
            .and_then(|s| s.default_backend.as_ref())
            .is_some()
}
