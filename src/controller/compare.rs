//! Field-scoped equality between observed and desired objects
//!
//! The API server fills stored objects with defaults this operator never
//! sets (cluster IPs, node ports, resource versions, status blocks), so
//! full structural equality would flag every pass as changed. Only the
//! fields the operator manages participate in these comparisons.

use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::api::networking::v1::Ingress;

/// Services are equal iff their ordered port lists match on
/// name, protocol, port, and target port.
pub fn services_equal(observed: &Service, desired: &Service) -> bool {
    ports_equal(service_ports(observed), service_ports(desired))
}

fn service_ports(service: &Service) -> &[ServicePort] {
    service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_deref())
        .unwrap_or(&[])
}

fn ports_equal(found: &[ServicePort], wanted: &[ServicePort]) -> bool {
    if found.len() != wanted.len() {
        return false;
    }
    found.iter().zip(wanted).all(|(f, w)| {
        f.name == w.name
            && f.protocol == w.protocol
            && f.port == w.port
            && f.target_port == w.target_port
    })
}

/// Ingresses are equal iff the managed fields match: the default backend
/// and the rule list.
pub fn ingresses_equal(observed: &Ingress, desired: &Ingress) -> bool {
    let found = observed.spec.as_ref();
    let wanted = desired.spec.as_ref();

    found.and_then(|s| s.default_backend.as_ref())
        == wanted.and_then(|s| s.default_backend.as_ref())
        && found.and_then(|s| s.rules.as_ref()) == wanted.and_then(|s| s.rules.as_ref())
}
