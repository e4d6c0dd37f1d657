//! Unit tests for port-mapping validation.

#[cfg(test)]
mod tests {
    use crate::controller::ports::validate_ports;
    use crate::crd::{PortProtocol, PortSpec};
    use crate::error::Error;

    fn mapping(protocol: PortProtocol, port: i32, target_port: i32) -> PortSpec {
        PortSpec {
            protocol,
            port,
            target_port,
        }
    }

    // -----------------------------------------------------------------------
    // External-port uniqueness
    // -----------------------------------------------------------------------

    #[test]
    fn test_empty_port_list_is_valid() {
        assert!(validate_ports(&[]).is_ok());
    }

    #[test]
    fn test_distinct_external_ports_are_valid() {
        let ports = vec![
            mapping(PortProtocol::Tcp, 8080, 1337),
            mapping(PortProtocol::Udp, 9090, 1337),
        ];
        assert!(validate_ports(&ports).is_ok());
    }

    #[test]
    fn test_same_external_port_different_targets_conflicts() {
        let ports = vec![
            mapping(PortProtocol::Tcp, 8080, 1337),
            mapping(PortProtocol::Tcp, 8080, 2000),
        ];
        match validate_ports(&ports) {
            Err(Error::ConflictingPortMapping {
                external_port,
                existing_target,
                new_target,
            }) => {
                assert_eq!(external_port, 8080);
                assert_eq!(existing_target, 1337);
                assert_eq!(new_target, 2000);
            }
            other => panic!("expected ConflictingPortMapping, got {:?}", other),
        }
    }

    #[test]
    fn test_same_external_port_same_target_is_valid() {
        let ports = vec![
            mapping(PortProtocol::Tcp, 8080, 1337),
            mapping(PortProtocol::Tcp, 8080, 1337),
        ];
        assert!(validate_ports(&ports).is_ok());
    }

    #[test]
    fn test_zero_external_port_resolves_to_target() {
        // 0 -> 1337 resolves to 1337 -> 1337, clashing with 1337 -> 2000
        let ports = vec![
            mapping(PortProtocol::Tcp, 0, 1337),
            mapping(PortProtocol::Tcp, 1337, 2000),
        ];
        match validate_ports(&ports) {
            Err(Error::ConflictingPortMapping { external_port, .. }) => {
                assert_eq!(external_port, 1337);
            }
            other => panic!("expected ConflictingPortMapping, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_external_port_self_mapping_is_valid() {
        let ports = vec![
            mapping(PortProtocol::Tcp, 0, 1337),
            mapping(PortProtocol::Tcp, 1337, 1337),
        ];
        assert!(validate_ports(&ports).is_ok());
    }

    // -----------------------------------------------------------------------
    // HTTPS exclusivity
    // -----------------------------------------------------------------------

    #[test]
    fn test_single_https_port_is_valid() {
        let ports = vec![
            mapping(PortProtocol::Https, 443, 8443),
            mapping(PortProtocol::Tcp, 0, 1337),
        ];
        assert!(validate_ports(&ports).is_ok());
    }

    #[test]
    fn test_two_https_ports_are_rejected() {
        let ports = vec![
            mapping(PortProtocol::Https, 443, 8443),
            mapping(PortProtocol::Https, 8443, 9443),
        ];
        assert!(matches!(
            validate_ports(&ports),
            Err(Error::MultipleHttpsPorts)
        ));
    }

    #[test]
    fn test_https_conflict_detected_before_port_conflict() {
        // Both violations present; the HTTPS flag trips on the second entry
        let ports = vec![
            mapping(PortProtocol::Https, 443, 8443),
            mapping(PortProtocol::Https, 443, 9443),
        ];
        assert!(matches!(
            validate_ports(&ports),
            Err(Error::MultipleHttpsPorts)
        ));
    }
}
