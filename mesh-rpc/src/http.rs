use std::sync::Arc;

use actix_web::{web, App, HttpRequest, HttpResponse};
use futures::future::join_all;
use mesh_crypto::TokenService;
use mesh_primitives::{MeshError, MethodParams, NodeRole};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::proxy::Target;
use crate::state::RpcState;

#[derive(Deserialize)]
struct RpcRequest {
    method: String,
    #[serde(default)]
    params: Value,
    id: String,
}

#[derive(Serialize)]
struct RpcResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    id: String,
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    header.strip_prefix("Bearer ").map(|s| s.to_string())
}

/// Validates the bearer on every path except the ones spec.md §6 lists as
/// exempt (`/health`, `/internal/gossip/*`, `/cert/challenge/{c}`, which
/// isn't served by this router at all).
fn authenticate(state: &RpcState, req: &HttpRequest) -> Result<(), MeshError> {
    let token = bearer_token(req).ok_or_else(|| MeshError::Auth("missing bearer token".into()))?;
    state.tokens.verify(&token).map_err(|err| MeshError::Auth(err.to_string()))?;
    Ok(())
}

async fn health(state: web::Data<Arc<RpcState>>) -> HttpResponse {
    let active_nodes = state.gossip.table.alive_peers().len() + 1;
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "node_id": state.node_id,
        "role": state.role.as_str(),
        "uptime_seconds": state.uptime_seconds(),
        "active_nodes": active_nodes,
    }))
}

async fn rpc(
    state: web::Data<Arc<RpcState>>,
    req: HttpRequest,
    body: web::Json<RpcRequest>,
) -> HttpResponse {
    if let Err(err) = authenticate(&state, &req) {
        return HttpResponse::Unauthorized().json(json!({ "error": err.to_string(), "id": body.id }));
    }

    let params = MethodParams::from_value(body.params.clone());
    let result = state.registry.dispatch(&body.method, params).await;
    match result {
        Ok(value) => HttpResponse::Ok().json(RpcResponse { result: Some(value), error: None, id: body.id.clone() }),
        Err(err) => {
            HttpResponse::Ok().json(RpcResponse { result: None, error: Some(err.to_string()), id: body.id.clone() })
        }
    }
}

#[derive(Deserialize)]
struct TokenRequest {
    node_id: String,
}

async fn issue_token(state: web::Data<Arc<RpcState>>, body: web::Json<TokenRequest>) -> HttpResponse {
    match state.tokens.issue(&body.node_id, true) {
        Ok(token) => HttpResponse::Ok().json(json!({ "access_token": token, "token_type": "bearer" })),
        Err(err) => HttpResponse::InternalServerError().json(json!({ "error": err.to_string() })),
    }
}

async fn gossip_join(
    state: web::Data<Arc<RpcState>>,
    body: web::Json<mesh_gossip::WireFrame>,
) -> HttpResponse {
    match state.gossip.handle_incoming(body.into_inner()) {
        Ok(frame) => HttpResponse::Ok().json(frame),
        Err(err) => HttpResponse::InternalServerError().json(json!({ "error": err.to_string() })),
    }
}

async fn gossip_exchange(
    state: web::Data<Arc<RpcState>>,
    body: web::Json<mesh_gossip::WireFrame>,
) -> HttpResponse {
    gossip_join(state, body).await
}

#[derive(Serialize)]
struct NodeView {
    node_id: String,
    address: String,
    port: u16,
    role: String,
    status: String,
}

async fn cluster_nodes(state: web::Data<Arc<RpcState>>, req: HttpRequest) -> HttpResponse {
    if let Err(err) = authenticate(&state, &req) {
        return HttpResponse::Unauthorized().json(json!({ "error": err.to_string() }));
    }
    let mut nodes: Vec<NodeView> = state
        .gossip
        .table
        .snapshot_all()
        .into_iter()
        .map(|n| NodeView {
            node_id: n.node_id,
            address: n.address,
            port: n.port,
            role: n.role.as_str().to_string(),
            status: format!("{:?}", n.status).to_lowercase(),
        })
        .collect();
    nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
    let coordinators = nodes.iter().filter(|n| n.role == "coordinator").count();
    let workers = nodes.iter().filter(|n| n.role == "worker").count();
    HttpResponse::Ok().json(json!({
        "nodes": nodes,
        "total": nodes.len(),
        "coordinators": coordinators,
        "workers": workers,
    }))
}

#[derive(Deserialize)]
struct BroadcastRequest {
    method: String,
    #[serde(default)]
    params: Value,
    target_role: Option<String>,
}

async fn broadcast(
    state: web::Data<Arc<RpcState>>,
    req: HttpRequest,
    body: web::Json<BroadcastRequest>,
) -> HttpResponse {
    if let Err(err) = authenticate(&state, &req) {
        return HttpResponse::Unauthorized().json(json!({ "error": err.to_string() }));
    }

    let role_filter = match body.target_role.as_deref() {
        Some("coordinator") => Some(NodeRole::Coordinator),
        Some("worker") => Some(NodeRole::Worker),
        Some(other) => {
            return HttpResponse::Ok()
                .json(json!({ "error": format!("unknown target_role: {other}") }))
        }
        None => None,
    };

    let targets: Vec<_> = state
        .gossip
        .table
        .alive_peers()
        .into_iter()
        .filter(|p| role_filter.map(|r| p.role == r).unwrap_or(true))
        .collect();

    let broadcast_id = uuid::Uuid::new_v4().to_string();
    let proxy = state.proxy();
    let futures = targets.iter().map(|peer| {
        let proxy = &proxy;
        let method = body.method.clone();
        let params = MethodParams::from_value(body.params.clone());
        let node_id = peer.node_id.clone();
        async move {
            let (service, method_name) = match method.split_once('/') {
                Some(parts) => parts,
                None => return json!({ "node_id": node_id, "ok": false, "error": "malformed method" }),
            };
            let result = proxy
                .service(service)
                .target(Target::Peer(node_id.clone()))
                .call(method_name, params)
                .await;
            match result {
                Ok(value) => json!({ "node_id": node_id, "ok": true, "result": value }),
                Err(err) => {
                    warn!(peer = %node_id, error = %err, "broadcast call failed");
                    json!({ "node_id": node_id, "ok": false, "error": err.to_string() })
                }
            }
        }
    });

    let results: Vec<Value> = join_all(futures).await;
    let success_count = results.iter().filter(|r| r["ok"] == json!(true)).count();

    HttpResponse::Ok().json(json!({
        "broadcast_id": broadcast_id,
        "results": results,
        "success_count": success_count,
        "total_count": targets.len(),
    }))
}

#[derive(Deserialize)]
struct CertIssueRequest {
    node_id: String,
    challenge: String,
    ips: Vec<String>,
    dnsnames: Vec<String>,
    #[serde(default)]
    old_fingerprint: Option<String>,
}

/// Signs a leaf certificate for a worker completing bootstrap (spec.md
/// §4.3 steps (c)-(e)). Requires a reachability proof first: the
/// coordinator GETs the worker's own challenge-validation listener and
/// checks the challenge is echoed back before it will sign anything.
async fn cert_issue(state: web::Data<Arc<RpcState>>, body: web::Json<CertIssueRequest>) -> HttpResponse {
    let Some(ca) = state.ca.as_ref() else {
        return HttpResponse::BadRequest()
            .json(json!({ "error": "this node does not hold a certificate authority" }));
    };

    if let Some(fingerprint) = &body.old_fingerprint {
        if let Ok(current) = ca.fingerprint() {
            if &current == fingerprint {
                tracing::debug!(node_id = %body.node_id, "worker cert fingerprint already current");
            }
        }
    }

    let challenge_ok = verify_challenge(&body.ips, &body.challenge).await;
    if !challenge_ok {
        return HttpResponse::Unauthorized()
            .json(json!({ "error": "worker did not echo challenge at its challenge port" }));
    }

    let mut sans = body.dnsnames.clone();
    sans.extend(body.ips.clone());
    match ca.sign_leaf(&body.node_id, &sans, 365) {
        Ok(bundle) => HttpResponse::Ok().json(json!({
            "cert_pem": bundle.cert_pem,
            "key_pem": bundle.key_pem,
        })),
        Err(err) => HttpResponse::InternalServerError().json(json!({ "error": err.to_string() })),
    }
}

/// Reverse HTTP GET (plain, not HTTPS: the worker has no cert yet) to
/// `/cert/challenge/{challenge}` on each candidate address, on the
/// dedicated challenge port the worker brought up for this purpose
/// (spec.md §4.3 step (d)).
async fn verify_challenge(ips: &[String], challenge: &str) -> bool {
    const CHALLENGE_PORT: u16 = 9101;
    let client = awc::Client::default();
    for ip in ips {
        let url = format!("http://{ip}:{CHALLENGE_PORT}/cert/challenge/{challenge}");
        let Ok(mut resp) = client.get(&url).send().await else { continue };
        let Ok(body) = resp.json::<Value>().await else { continue };
        if body.get("challenge").and_then(|v| v.as_str()) == Some(challenge) {
            return true;
        }
    }
    false
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/rpc", web::post().to(rpc))
        .route("/auth/token", web::post().to(issue_token))
        .route("/internal/gossip/join", web::post().to(gossip_join))
        .route("/internal/gossip/exchange", web::post().to(gossip_exchange))
        .route("/internal/cert/issue", web::post().to(cert_issue))
        .route("/admin/broadcast", web::post().to(broadcast))
        .route("/cluster/nodes", web::get().to(cluster_nodes));
}

pub fn build_app(
    state: Arc<RpcState>,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(web::Data::new(state))
        .wrap(actix_cors::Cors::permissive())
        .configure(configure)
}
