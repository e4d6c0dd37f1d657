//! Shared types for challenge specifications
//!
//! These types describe the network exposure and health-check sidecar of a
//! hosted challenge workload and are used across the CRD definition and
//! the controller logic.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Wire protocol of a challenge port
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortProtocol {
    #[default]
    Tcp,
    Udp,
    /// Routed through the ingress; at most one per challenge
    Https,
}

impl PortProtocol {
    /// The protocol value the Kubernetes Service layer understands.
    /// HTTPS rides on TCP; the distinction only matters for routing.
    pub fn as_k8s(&self) -> &'static str {
        match self {
            PortProtocol::Udp => "UDP",
            PortProtocol::Tcp | PortProtocol::Https => "TCP",
        }
    }
}

impl std::fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortProtocol::Tcp => write!(f, "TCP"),
            PortProtocol::Udp => write!(f, "UDP"),
            PortProtocol::Https => write!(f, "HTTPS"),
        }
    }
}

/// One external-port to target-port mapping
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortSpec {
    #[serde(default)]
    pub protocol: PortProtocol,

    /// Externally visible port; 0 means "expose the target port directly"
    #[serde(default)]
    pub port: i32,

    /// Port the challenge container listens on
    pub target_port: i32,
}

impl PortSpec {
    /// External port with the 0-means-target convention applied
    pub fn resolved_port(&self) -> i32 {
        if self.port == 0 {
            self.target_port
        } else {
            self.port
        }
    }
}

/// Health-check sidecar configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthcheckSpec {
    /// Image running the health-check server for this challenge
    pub image: String,
}
