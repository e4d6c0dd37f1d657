//! Main reconciler for Challenge resources
//!
//! Implements the controller pattern using kube-rs runtime.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{
    api::{Api, Patch, PatchParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    ResourceExt,
};
use tracing::{error, info, instrument};

use super::{deployment, network};
use crate::crd::Challenge;
use crate::error::{Error, Result};

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let challenges: Api<Challenge> = Api::all(client.clone());

    info!("Starting Challenge controller");

    // Verify CRD exists
    match challenges.list(&Default::default()).await {
        Ok(_) => info!("Challenge CRD is available"),
        Err(e) => {
            error!(
                "Challenge CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "Challenge CRD not installed".to_string(),
            ));
        }
    }

    Controller::new(challenges, Config::default())
        // Watch owned resources for changes
        .owns::<Deployment>(Api::all(client.clone()), Config::default())
        .owns::<Service>(Api::all(client.clone()), Config::default())
        .owns::<Ingress>(Api::all(client.clone()), Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => info!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// One reconciliation pass
///
/// This function is called whenever:
/// - A Challenge is created, updated, or deleted
/// - An owned resource (Deployment, Service, Ingress) changes
/// - The requeue timer expires
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<Challenge>, ctx: Arc<ControllerState>) -> Result<Action> {
    let client = ctx.client.clone();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();

    info!("Reconciling Challenge {}/{}", namespace, name);

    match apply_challenge(&client, &obj).await {
        Ok(changed) => {
            let message = if changed {
                "Converged cluster resources"
            } else {
                "Cluster resources up to date"
            };
            update_status(&client, &obj, "Ready", Some(message)).await?;
            Ok(Action::requeue(Duration::from_secs(60)))
        }
        Err(e) => {
            update_status(&client, &obj, "Error", Some(&e.to_string())).await?;
            Err(e)
        }
    }
}

/// Deployment first, then network exposure; the network coordinator
/// re-evaluates everything from scratch, so a failed pass is finished by
/// the next one.
async fn apply_challenge(client: &Client, challenge: &Challenge) -> Result<bool> {
    deployment::ensure_deployment(client, challenge).await?;
    network::update_network(client, challenge).await
}

/// Update the status subresource of a Challenge
async fn update_status(
    client: &Client,
    challenge: &Challenge,
    phase: &str,
    message: Option<&str>,
) -> Result<()> {
    let namespace = challenge.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Challenge> = Api::namespaced(client.clone(), &namespace);

    let mut status = serde_json::json!({
        "phase": phase,
        "observedGeneration": challenge.metadata.generation,
    });
    if let Some(msg) = message {
        status["message"] = serde_json::Value::String(msg.to_string());
    }

    let patch = serde_json::json!({ "status": status });
    api.patch_status(
        &challenge.name_any(),
        &PatchParams::apply("challenge-operator"),
        &Patch::Merge(&patch),
    )
    .await
    .map_err(Error::KubeError)?;

    Ok(())
}

/// Error policy determines how to handle reconciliation errors
fn error_policy(challenge: Arc<Challenge>, error: &Error, _ctx: Arc<ControllerState>) -> Action {
    error!(
        "Reconciliation error for {}: {:?}",
        challenge.name_any(),
        error
    );

    // Use shorter retry for retriable errors
    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };

    Action::requeue(retry_duration)
}
