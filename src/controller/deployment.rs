//! Deployment builder and health-check injection for challenges

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, HTTPGetAction, PodSpec, PodTemplateSpec, Probe, ResourceRequirements,
    SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::instrument;

use super::services::{owner_reference, selector_labels, standard_labels};
use crate::crd::{Challenge, HealthcheckSpec};
use crate::error::{Error, Result};

/// Container the health-check probes attach to
pub const CHALLENGE_CONTAINER: &str = "challenge";
/// Sidecar container running the health-check server
pub const HEALTHCHECK_CONTAINER: &str = "healthcheck";
/// Port the health-check server listens on inside the pod
pub const HEALTHCHECK_PORT: i32 = 45281;
pub const HEALTHCHECK_PATH: &str = "/healthz";
/// Secret (and volume) carrying the proof-of-work bypass key
pub const POW_BYPASS: &str = "pow-bypass";
pub const POW_BYPASS_MOUNT_PATH: &str = "/pow-bypass";

const HEALTHCHECK_CPU_REQUEST: &str = "50m";
const HEALTHCHECK_CPU_LIMIT: &str = "1000m";

/// The desired deployment for a challenge: the base workload, with the
/// health-check probes and sidecar injected when the spec declares one.
pub fn desired_deployment(challenge: &Challenge) -> Result<Deployment> {
    let base = build_deployment(challenge);
    match &challenge.spec.healthcheck {
        Some(healthcheck) => with_healthcheck(base, healthcheck, &challenge.name_any()),
        None => Ok(base),
    }
}

fn build_deployment(challenge: &Challenge) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(challenge.name_any()),
            namespace: challenge.namespace(),
            labels: Some(standard_labels(challenge)),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(challenge.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(challenge)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector_labels(challenge)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: challenge.spec.containers.clone(),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Inject health-check wiring into a base deployment.
///
/// Attaches liveness and readiness probes to the `challenge` container,
/// appends a `healthcheck` sidecar if none exists, and pins its image, CPU
/// budget, and pow-bypass secret volume. A pure function of (base,
/// healthcheck); probe and sidecar fields are overwritten unconditionally,
/// so repeated application converges to the same deployment.
pub fn with_healthcheck(
    mut dep: Deployment,
    healthcheck: &HealthcheckSpec,
    challenge_name: &str,
) -> Result<Deployment> {
    let pod_spec = dep
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
        .ok_or_else(|| Error::MissingChallengeContainer(challenge_name.to_string()))?;

    let challenge_idx = pod_spec
        .containers
        .iter()
        .position(|c| c.name == CHALLENGE_CONTAINER)
        .ok_or_else(|| Error::MissingChallengeContainer(challenge_name.to_string()))?;

    pod_spec.containers[challenge_idx].liveness_probe = Some(Probe {
        failure_threshold: Some(2),
        http_get: Some(healthz_action()),
        initial_delay_seconds: Some(45),
        timeout_seconds: Some(3),
        period_seconds: Some(30),
        ..Default::default()
    });
    pod_spec.containers[challenge_idx].readiness_probe = Some(Probe {
        http_get: Some(healthz_action()),
        initial_delay_seconds: Some(5),
        timeout_seconds: Some(3),
        period_seconds: Some(5),
        ..Default::default()
    });

    let healthcheck_idx = match pod_spec
        .containers
        .iter()
        .position(|c| c.name == HEALTHCHECK_CONTAINER)
    {
        Some(idx) => idx,
        None => {
            pod_spec.containers.push(Container {
                name: HEALTHCHECK_CONTAINER.to_string(),
                ..Default::default()
            });
            pod_spec.containers.len() - 1
        }
    };

    let sidecar = &mut pod_spec.containers[healthcheck_idx];
    sidecar.image = Some(healthcheck.image.clone());
    sidecar.resources = Some(ResourceRequirements {
        requests: Some(BTreeMap::from([(
            "cpu".to_string(),
            Quantity(HEALTHCHECK_CPU_REQUEST.to_string()),
        )])),
        limits: Some(BTreeMap::from([(
            "cpu".to_string(),
            Quantity(HEALTHCHECK_CPU_LIMIT.to_string()),
        )])),
        ..Default::default()
    });
    sidecar.volume_mounts = Some(vec![VolumeMount {
        name: POW_BYPASS.to_string(),
        read_only: Some(true),
        mount_path: POW_BYPASS_MOUNT_PATH.to_string(),
        ..Default::default()
    }]);

    let volumes = pod_spec.volumes.get_or_insert_with(Vec::new);
    if !volumes.iter().any(|v| v.name == POW_BYPASS) {
        volumes.push(Volume {
            name: POW_BYPASS.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(POW_BYPASS.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    Ok(dep)
}

fn healthz_action() -> HTTPGetAction {
    HTTPGetAction {
        path: Some(HEALTHCHECK_PATH.to_string()),
        port: IntOrString::Int(HEALTHCHECK_PORT),
        ..Default::default()
    }
}

/// Apply the desired deployment with server-side apply
#[instrument(skip(client, challenge), fields(name = %challenge.name_any(), namespace = challenge.namespace()))]
pub async fn ensure_deployment(client: &Client, challenge: &Challenge) -> Result<()> {
    let namespace = challenge.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    let name = challenge.name_any();

    let mut deployment = desired_deployment(challenge)?;
    deployment.metadata.owner_references = Some(vec![owner_reference(challenge)]);

    let patch = Patch::Apply(&deployment);
    api.patch(
        &name,
        &PatchParams::apply("challenge-operator").force(),
        &patch,
    )
    .await?;

    Ok(())
}
