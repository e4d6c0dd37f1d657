//! Port-mapping validation for challenges

use std::collections::BTreeMap;

use crate::crd::{PortProtocol, PortSpec};
use crate::error::{Error, Result};

/// Validate the port-mapping table of a challenge.
///
/// The resolved mappings (with `port == 0` standing for the target port)
/// must form a function from external port to target port, and at most one
/// mapping may use HTTPS. Runs before any resource is built or compared;
/// failure aborts the whole pass without touching the cluster.
pub fn validate_ports(ports: &[PortSpec]) -> Result<()> {
    let mut seen_https = false;
    let mut mappings: BTreeMap<i32, i32> = BTreeMap::new();

    for port in ports {
        if port.protocol == PortProtocol::Https {
            if seen_https {
                return Err(Error::MultipleHttpsPorts);
            }
            seen_https = true;
        }

        let external = port.resolved_port();
        if let Some(&existing) = mappings.get(&external) {
            if existing != port.target_port {
                return Err(Error::ConflictingPortMapping {
                    external_port: external,
                    existing_target: existing,
                    new_target: port.target_port,
                });
            }
        }
        mappings.insert(external, port.target_port);
    }

    Ok(())
}
