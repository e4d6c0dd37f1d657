//! Unit tests for the deployment builder and health-check injection.

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Container;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    use crate::controller::deployment::{
        desired_deployment, with_healthcheck, CHALLENGE_CONTAINER, HEALTHCHECK_CONTAINER,
        HEALTHCHECK_PORT, POW_BYPASS,
    };
    use crate::crd::{Challenge, ChallengeSpec, HealthcheckSpec};
    use crate::error::Error;

    fn container(name: &str) -> Container {
        Container {
            name: name.to_string(),
            image: Some("gcr.io/example/image:latest".to_string()),
            ..Default::default()
        }
    }

    fn challenge(containers: Vec<Container>, healthcheck: Option<HealthcheckSpec>) -> Challenge {
        let mut challenge = Challenge::new(
            "pwn-me",
            ChallengeSpec {
                public: false,
                ports: vec![],
                replicas: 1,
                containers,
                healthcheck,
            },
        );
        challenge.metadata.namespace = Some("ctf".to_string());
        challenge
    }

    fn healthcheck() -> HealthcheckSpec {
        HealthcheckSpec {
            image: "gcr.io/example/healthcheck:latest".to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // Sidecar injection
    // -----------------------------------------------------------------------

    #[test]
    fn test_injection_appends_exactly_one_sidecar() {
        let challenge = challenge(vec![container(CHALLENGE_CONTAINER)], Some(healthcheck()));
        let dep = desired_deployment(&challenge).expect("deployment must build");

        let containers = dep.spec.unwrap().template.spec.unwrap().containers;
        assert_eq!(containers.len(), 2, "expected challenge + healthcheck");
        assert_eq!(containers[1].name, HEALTHCHECK_CONTAINER);
        assert_eq!(
            containers[1].image.as_deref(),
            Some("gcr.io/example/healthcheck:latest")
        );
    }

    #[test]
    fn test_sidecar_gets_fixed_cpu_budget() {
        let challenge = challenge(vec![container(CHALLENGE_CONTAINER)], Some(healthcheck()));
        let dep = desired_deployment(&challenge).unwrap();

        let containers = dep.spec.unwrap().template.spec.unwrap().containers;
        let resources = containers[1]
            .resources
            .as_ref()
            .expect("sidecar resources must be set");
        assert_eq!(
            resources.requests.as_ref().and_then(|r| r.get("cpu")),
            Some(&Quantity("50m".to_string()))
        );
        assert_eq!(
            resources.limits.as_ref().and_then(|l| l.get("cpu")),
            Some(&Quantity("1000m".to_string()))
        );
    }

    #[test]
    fn test_sidecar_mounts_pow_bypass_secret_read_only() {
        let challenge = challenge(vec![container(CHALLENGE_CONTAINER)], Some(healthcheck()));
        let dep = desired_deployment(&challenge).unwrap();

        let pod_spec = dep.spec.unwrap().template.spec.unwrap();

        let mounts = pod_spec.containers[1]
            .volume_mounts
            .as_ref()
            .expect("sidecar must have volume mounts");
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].name, POW_BYPASS);
        assert_eq!(mounts[0].mount_path, "/pow-bypass");
        assert_eq!(mounts[0].read_only, Some(true));

        let volumes = pod_spec.volumes.expect("pod must have volumes");
        let volume = volumes
            .iter()
            .find(|v| v.name == POW_BYPASS)
            .expect("pow-bypass volume must exist");
        assert_eq!(
            volume
                .secret
                .as_ref()
                .and_then(|s| s.secret_name.as_deref()),
            Some(POW_BYPASS)
        );
    }

    #[test]
    fn test_existing_sidecar_is_reconfigured_not_duplicated() {
        let mut stale = container(HEALTHCHECK_CONTAINER);
        stale.image = Some("gcr.io/example/old-healthcheck:v1".to_string());

        let challenge = challenge(
            vec![container(CHALLENGE_CONTAINER), stale],
            Some(healthcheck()),
        );
        let dep = desired_deployment(&challenge).unwrap();

        let containers = dep.spec.unwrap().template.spec.unwrap().containers;
        assert_eq!(containers.len(), 2, "no duplicate sidecar");
        assert_eq!(
            containers[1].image.as_deref(),
            Some("gcr.io/example/healthcheck:latest"),
            "sidecar image must be overwritten"
        );
    }

    // -----------------------------------------------------------------------
    // Probes on the challenge container
    // -----------------------------------------------------------------------

    #[test]
    fn test_challenge_container_gains_both_probes() {
        let challenge = challenge(vec![container(CHALLENGE_CONTAINER)], Some(healthcheck()));
        let dep = desired_deployment(&challenge).unwrap();

        let containers = dep.spec.unwrap().template.spec.unwrap().containers;
        let challenge_container = &containers[0];

        let liveness = challenge_container
            .liveness_probe
            .as_ref()
            .expect("liveness probe must be set");
        assert_eq!(liveness.failure_threshold, Some(2));
        assert_eq!(liveness.initial_delay_seconds, Some(45));
        assert_eq!(liveness.timeout_seconds, Some(3));
        assert_eq!(liveness.period_seconds, Some(30));
        let http_get = liveness.http_get.as_ref().expect("liveness is an HTTP GET");
        assert_eq!(http_get.path.as_deref(), Some("/healthz"));
        assert_eq!(http_get.port, IntOrString::Int(HEALTHCHECK_PORT));

        let readiness = challenge_container
            .readiness_probe
            .as_ref()
            .expect("readiness probe must be set");
        assert_eq!(readiness.initial_delay_seconds, Some(5));
        assert_eq!(readiness.timeout_seconds, Some(3));
        assert_eq!(readiness.period_seconds, Some(5));
        assert_eq!(
            readiness
                .http_get
                .as_ref()
                .and_then(|h| h.path.as_deref()),
            Some("/healthz")
        );
    }

    #[test]
    fn test_missing_challenge_container_is_fatal() {
        let challenge = challenge(vec![container("sidekick")], Some(healthcheck()));
        match desired_deployment(&challenge) {
            Err(Error::MissingChallengeContainer(name)) => assert_eq!(name, "pwn-me"),
            other => panic!("expected MissingChallengeContainer, got {:?}", other),
        }
    }

    // -----------------------------------------------------------------------
    // Without a healthcheck spec
    // -----------------------------------------------------------------------

    #[test]
    fn test_no_healthcheck_means_no_injection() {
        let challenge = challenge(vec![container(CHALLENGE_CONTAINER)], None);
        let dep = desired_deployment(&challenge).unwrap();

        let pod_spec = dep.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod_spec.containers.len(), 1);
        assert!(pod_spec.containers[0].liveness_probe.is_none());
        assert!(pod_spec.containers[0].readiness_probe.is_none());
        assert!(pod_spec.volumes.is_none());
    }

    // -----------------------------------------------------------------------
    // Idempotent re-application
    // -----------------------------------------------------------------------

    #[test]
    fn test_reapplying_injection_converges() {
        let challenge = challenge(vec![container(CHALLENGE_CONTAINER)], Some(healthcheck()));
        let once = desired_deployment(&challenge).unwrap();
        let twice = with_healthcheck(once.clone(), &healthcheck(), "pwn-me").unwrap();

        assert_eq!(
            once, twice,
            "re-running injection on its own output must change nothing"
        );
    }
}
