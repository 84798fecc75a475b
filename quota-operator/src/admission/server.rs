use axum::{Json, Router, extract::State, routing::post};
use axum_server::tls_rustls::RustlsConfig;
use fleetquota_types::ClusterQuota;
use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim, Pod};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::{Api, Client, ResourceExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{namespace, quota, storage_claim, workload};
use crate::clusterquota::{namespace_calc::NamespaceUsageCalculator, quota_client::QuotaClient};
use crate::config::Config;
use crate::util::Error;

struct AdmissionContext {
    client: Client,
    calculator: NamespaceUsageCalculator,
    quota_client: QuotaClient,
}

/// Entrypoint for the synchronous validating admission webhook server.
/// Served over TLS directly (no sidecar terminator); the certificate and
/// key are read once at startup from paths the platform mounts.
pub async fn run(client: Client, config: Arc<Config>, shutdown: CancellationToken) -> Result<(), Error> {
    let context = Arc::new(AdmissionContext {
        calculator: NamespaceUsageCalculator::new(client.clone()),
        quota_client: QuotaClient::new(client.clone()),
        client,
    });

    let app = Router::new()
        .route("/validate/workload", post(validate_workload))
        .route("/validate/storage-claim", post(validate_storage_claim))
        .route("/validate/clusterquota", post(validate_clusterquota))
        .route("/validate/namespace", post(validate_namespace))
        .with_state(context);

    let tls_config = RustlsConfig::from_pem_file(&config.webhook_cert_path, &config.webhook_key_path)
        .await
        .map_err(|e| Error::UserInput(format!("failed to load webhook TLS material: {e}")))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.webhook_port));
    println!("admission webhook listening on {addr}");

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
    });

    axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|e| Error::UserInput(format!("admission server error: {e}")))?;

    Ok(())
}

async fn namespace_labels(client: &Client, name: &str) -> Option<std::collections::BTreeMap<String, String>> {
    let api: Api<Namespace> = Api::all(client.clone());
    api.get(name).await.ok().map(|ns| ns.labels().clone())
}

async fn validate_workload(State(ctx): State<Arc<AdmissionContext>>, Json(review): Json<AdmissionReview<Pod>>) -> Json<AdmissionReview<Pod>> {
    let req: AdmissionRequest<Pod> = review.try_into().unwrap_or_default();
    let response = AdmissionResponse::from(&req);
    let namespace_name = req.namespace.clone().unwrap_or_default();

    let Some(labels) = namespace_labels(&ctx.client, &namespace_name).await else {
        return Json(response.deny("namespace not found").into_review());
    };

    let decision = match (&req.old_object, &req.object) {
        (Some(old), Some(new)) => {
            workload::validate_update(&ctx.calculator, &ctx.quota_client, &namespace_name, &labels, old, new).await
        }
        (None, Some(new)) => workload::validate_create(&ctx.calculator, &ctx.quota_client, &namespace_name, &labels, new).await,
        _ => Ok(workload::Decision::allow()),
    };

    match decision {
        Ok(d) if d.allowed => Json(response.into_review()),
        Ok(d) => Json(response.deny(d.reason.unwrap_or_default()).into_review()),
        Err(e) => Json(response.deny(format!("internal error: {e}")).into_review()),
    }
}

async fn validate_storage_claim(
    State(ctx): State<Arc<AdmissionContext>>,
    Json(review): Json<AdmissionReview<PersistentVolumeClaim>>,
) -> Json<AdmissionReview<PersistentVolumeClaim>> {
    let req: AdmissionRequest<PersistentVolumeClaim> = review.try_into().unwrap_or_default();
    let response = AdmissionResponse::from(&req);
    let namespace_name = req.namespace.clone().unwrap_or_default();

    let Some(labels) = namespace_labels(&ctx.client, &namespace_name).await else {
        return Json(response.deny("namespace not found").into_review());
    };

    let decision = match (&req.old_object, &req.object) {
        (Some(old), Some(new)) => {
            storage_claim::validate_update(&ctx.calculator, &ctx.quota_client, &namespace_name, &labels, old, new).await
        }
        (None, Some(new)) => storage_claim::validate_create(&ctx.calculator, &ctx.quota_client, &namespace_name, &labels, new).await,
        _ => Ok(workload::Decision::allow()),
    };

    match decision {
        Ok(d) if d.allowed => Json(response.into_review()),
        Ok(d) => Json(response.deny(d.reason.unwrap_or_default()).into_review()),
        Err(e) => Json(response.deny(format!("internal error: {e}")).into_review()),
    }
}

async fn validate_clusterquota(
    State(ctx): State<Arc<AdmissionContext>>,
    Json(review): Json<AdmissionReview<ClusterQuota>>,
) -> Json<AdmissionReview<ClusterQuota>> {
    let req: AdmissionRequest<ClusterQuota> = review.try_into().unwrap_or_default();
    let response = AdmissionResponse::from(&req);

    let Some(new_quota) = &req.object else {
        return Json(response.into_review());
    };

    let namespaces_api: Api<Namespace> = Api::all(ctx.client.clone());
    let quotas_api: Api<ClusterQuota> = Api::all(ctx.client.clone());
    let (all_namespaces, all_quotas) = match (namespaces_api.list(&Default::default()).await, quotas_api.list(&Default::default()).await) {
        (Ok(ns), Ok(q)) => (ns.items, q.items),
        _ => return Json(response.deny("failed to list namespaces or quotas").into_review()),
    };

    let decision = quota::validate(new_quota, &all_namespaces, &all_quotas).await;
    match decision {
        Ok(d) if d.allowed => Json(response.into_review()),
        Ok(d) => Json(response.deny(d.reason.unwrap_or_default()).into_review()),
        Err(e) => Json(response.deny(format!("internal error: {e}")).into_review()),
    }
}

async fn validate_namespace(
    State(ctx): State<Arc<AdmissionContext>>,
    Json(review): Json<AdmissionReview<Namespace>>,
) -> Json<AdmissionReview<Namespace>> {
    let req: AdmissionRequest<Namespace> = review.try_into().unwrap_or_default();
    let response = AdmissionResponse::from(&req);

    let (Some(old), Some(new)) = (&req.old_object, &req.object) else {
        return Json(response.into_review());
    };

    let quotas_api: Api<ClusterQuota> = Api::all(ctx.client.clone());
    let all_quotas = match quotas_api.list(&Default::default()).await {
        Ok(q) => q.items,
        Err(_) => return Json(response.deny("failed to list cluster quotas").into_review()),
    };

    let decision = namespace::validate(old, new, &all_quotas);
    if decision.allowed { Json(response.into_review()) } else { Json(response.deny(decision.reason.unwrap_or_default()).into_review()) }
}
