//! Challenge-Operator: Kubernetes operator for hosted challenge workloads
//!
//! This crate keeps a challenge's network exposure (internal Service,
//! LoadBalancer Service, Ingress) and its health-check sidecar converged
//! with the Challenge custom resource.

pub mod controller;
pub mod crd;
pub mod error;

pub use crate::error::{Error, Result};
