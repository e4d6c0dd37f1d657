//! Controller module for Challenge reconciliation
//! This module contains the controller loop, the network convergence
//! engine, and the deployment builder for challenge workloads.

mod compare;
mod deployment;
mod network;
mod ports;
mod reconciler;
mod services;

#[cfg(test)]
mod deployment_test;
#[cfg(test)]
mod ports_test;

pub use deployment::{desired_deployment, ensure_deployment, with_healthcheck};
pub use network::{resolve_domain_name, update_network, ConvergeAction};
pub use ports::validate_ports;
pub use reconciler::{run_controller, ControllerState};
pub use services::{
    build_ingress, build_internal_service, build_load_balancer_service, ingress_should_exist,
    internal_service_name, load_balancer_service_name, load_balancer_should_exist,
    owner_reference, standard_labels,
};
