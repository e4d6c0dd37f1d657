//! Challenge Custom Resource Definition
//!
//! A Challenge describes a hosted workload: the containers it runs, the
//! ports it exposes, whether it is publicly reachable, and an optional
//! health-check sidecar.

use k8s_openapi::api::core::v1::Container;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{HealthcheckSpec, PortSpec};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "challenge.dev",
    version = "v1",
    kind = "Challenge",
    namespaced,
    status = "ChallengeStatus",
    shortname = "chal",
    printcolumn = r#"{"name":"Public","type":"boolean","jsonPath":".spec.public"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSpec {
    /// Whether the challenge is reachable from outside the cluster
    #[serde(default)]
    pub public: bool,

    /// Port mappings exposed by the challenge
    #[serde(default)]
    pub ports: Vec<PortSpec>,

    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Containers of the challenge pod; one must be named "challenge"
    #[serde(default)]
    #[schemars(with = "Vec<serde_json::Value>")]
    pub containers: Vec<Container>,

    /// Health-check sidecar; absent disables probe and sidecar injection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthcheckSpec>,
}

fn default_replicas() -> i32 {
    1
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeStatus {
    pub phase: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
