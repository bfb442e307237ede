//! HTTP server: health, metrics and the ledger API

use std::future::Future;
use std::net::SocketAddr;

use alloy_primitives::{Address, B256};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use eyre::eyre;
use exit_ledger::{Claim, ClaimReceipt, DepositReceipt, EventBatch, LeafType, TokenInfo};
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::dto::{
    BalanceResponse, BridgeAssetRequest, BridgeMessageRequest, ClaimRequest, ClaimedResponse,
    DepositCountResponse, EmergencyResponse, EventsQuery, GlobalExitRootResponse,
    GlobalExitRootUpdateResponse, HealthResponse, MintRequest, ProofResponse, RootResponse,
    WrappedResponse,
};
use crate::error::ApiError;
use crate::node::{Node, SharedNode};

/// Default and maximum page size of `/events`.
pub const DEFAULT_EVENTS_LIMIT: usize = 100;
pub const MAX_EVENTS_LIMIT: usize = 1000;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Deposits and admin routes act for the operator holding `ADMIN_TOKEN`.
fn require_admin(node: &Node, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = node.config.admin_token.as_deref() else {
        return Err(ApiError::Unauthorized(
            "admin API disabled: ADMIN_TOKEN not set".to_string(),
        ));
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    match provided {
        Some(token) if token_matches(token.as_bytes(), expected.as_bytes()) => Ok(()),
        _ => Err(ApiError::Unauthorized(
            "missing or invalid bearer token".to_string(),
        )),
    }
}

// Compares every byte regardless of where the first mismatch is
fn token_matches(provided: &[u8], expected: &[u8]) -> bool {
    provided.len() == expected.len()
        && provided
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

// ============================================================================
// Health & Metrics
// ============================================================================

async fn health_check(State(node): State<SharedNode>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        network_id: node.ledger.network_id(),
        aggregator_authority: node.config.aggregator_authority,
        emergency_state: node.ledger.is_emergency_state(),
        deposit_count: node.ledger.deposit_count(),
        known_global_exit_roots: node.ledger.known_global_exit_root_count(),
        sync_cursor: node.sync_cursor(),
        last_sync_ok: node.last_sync_ok(),
    })
}

/// Liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Readiness check: replicas wait for their first successful sync
async fn readiness(State(node): State<SharedNode>) -> (StatusCode, &'static str) {
    if node.is_ready() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY")
    }
}

async fn prometheus_metrics(State(node): State<SharedNode>) -> Response {
    node.refresh_gauges();

    let encoder = TextEncoder::new();
    let metric_families = node.metrics.registry.gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

// ============================================================================
// Queries
// ============================================================================

async fn root(State(node): State<SharedNode>) -> Json<RootResponse> {
    let ledger = &node.ledger;
    Json(RootResponse {
        network_id: ledger.network_id(),
        local_exit_root: ledger.get_root(),
        deposit_count: ledger.deposit_count(),
        last_updated_deposit_count: ledger.last_updated_deposit_count(),
        mainnet_exit_root: ledger.mainnet_exit_root(),
        rollup_exit_root: ledger.rollup_exit_root(),
        last_global_exit_root: ledger.last_global_exit_root(),
        l1_info_root: ledger.l1_info_root(),
        last_local_exit_root: ledger.last_local_exit_root(),
    })
}

async fn deposit_count(State(node): State<SharedNode>) -> Json<DepositCountResponse> {
    Json(DepositCountResponse {
        deposit_count: node.ledger.deposit_count(),
        last_updated_deposit_count: node.ledger.last_updated_deposit_count(),
    })
}

#[derive(Debug, serde::Deserialize)]
struct ProofQuery {
    deposit_count: Option<u64>,
}

async fn proof(
    State(node): State<SharedNode>,
    Path(index): Path<u32>,
    Query(query): Query<ProofQuery>,
) -> ApiResult<ProofResponse> {
    let ledger = &node.ledger;
    let (deposit_count, proof, root) = match query.deposit_count {
        Some(count) => (count, ledger.proof_at(index, count)?, ledger.root_at(count)?),
        None => {
            let count = ledger.deposit_count();
            (count, ledger.proof_at(index, count)?, ledger.root_at(count)?)
        }
    };
    Ok(Json(ProofResponse {
        index,
        deposit_count,
        root,
        proof,
    }))
}

async fn claimed(
    State(node): State<SharedNode>,
    Path((source_network, leaf_index)): Path<(u32, u32)>,
) -> Json<ClaimedResponse> {
    Json(ClaimedResponse {
        source_network,
        leaf_index,
        claimed: node.ledger.is_claimed(leaf_index, source_network),
    })
}

async fn wrapped(
    State(node): State<SharedNode>,
    Path((origin_network, origin_token_address)): Path<(u32, Address)>,
) -> Json<WrappedResponse> {
    Json(WrappedResponse {
        origin_network,
        origin_token_address,
        wrapped_token_address: node
            .ledger
            .get_token_wrapped_address(origin_network, &origin_token_address),
    })
}

async fn token_info(
    State(node): State<SharedNode>,
    Path(wrapped): Path<Address>,
) -> ApiResult<TokenInfo> {
    node.ledger
        .wrapped_token_info(&wrapped)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("{} is not a wrapped token", wrapped)))
}

async fn global_exit_root(
    State(node): State<SharedNode>,
    Path(global_exit_root): Path<B256>,
) -> Json<GlobalExitRootResponse> {
    Json(GlobalExitRootResponse {
        global_exit_root,
        known: node.ledger.is_global_exit_root_known(&global_exit_root),
        timestamp: node.ledger.global_exit_root_timestamp(&global_exit_root),
    })
}

async fn events(
    State(node): State<SharedNode>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<EventBatch> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENTS_LIMIT)
        .min(MAX_EVENTS_LIMIT);
    Ok(Json(node.ledger.events_since(query.from, limit)?))
}

async fn balance(
    State(node): State<SharedNode>,
    Path((token, holder)): Path<(Address, Address)>,
) -> Json<BalanceResponse> {
    Json(BalanceResponse {
        token,
        holder,
        balance: node.executor.balance_of(token, holder),
    })
}

// ============================================================================
// Deposits & Claims
// ============================================================================

async fn bridge_asset(
    State(node): State<SharedNode>,
    headers: HeaderMap,
    Json(request): Json<BridgeAssetRequest>,
) -> ApiResult<DepositReceipt> {
    require_admin(&node, &headers)?;
    Ok(Json(node.bridge_asset(request.sender, request.deposit)?))
}

async fn bridge_message(
    State(node): State<SharedNode>,
    headers: HeaderMap,
    Json(request): Json<BridgeMessageRequest>,
) -> ApiResult<DepositReceipt> {
    require_admin(&node, &headers)?;
    Ok(Json(node.bridge_message(request.sender, request.deposit)?))
}

async fn claim_asset(
    State(node): State<SharedNode>,
    Json(request): Json<ClaimRequest>,
) -> ApiResult<ClaimReceipt> {
    let claim = Claim::try_from(request)?;
    Ok(Json(node.claim(LeafType::Asset, &claim)?))
}

async fn claim_message(
    State(node): State<SharedNode>,
    Json(request): Json<ClaimRequest>,
) -> ApiResult<ClaimReceipt> {
    let claim = Claim::try_from(request)?;
    Ok(Json(node.claim(LeafType::Message, &claim)?))
}

// ============================================================================
// Admin
// ============================================================================

async fn update_global_exit_root(
    State(node): State<SharedNode>,
    headers: HeaderMap,
) -> ApiResult<GlobalExitRootUpdateResponse> {
    require_admin(&node, &headers)?;
    let global_exit_root = node.update_global_exit_root(true)?;
    Ok(Json(GlobalExitRootUpdateResponse {
        global_exit_root,
        last_updated_deposit_count: node.ledger.last_updated_deposit_count(),
    }))
}

async fn activate_emergency(
    State(node): State<SharedNode>,
    headers: HeaderMap,
) -> ApiResult<EmergencyResponse> {
    require_admin(&node, &headers)?;
    node.set_emergency_state(true)?;
    Ok(Json(EmergencyResponse {
        emergency_state: true,
    }))
}

async fn deactivate_emergency(
    State(node): State<SharedNode>,
    headers: HeaderMap,
) -> ApiResult<EmergencyResponse> {
    require_admin(&node, &headers)?;
    node.set_emergency_state(false)?;
    Ok(Json(EmergencyResponse {
        emergency_state: false,
    }))
}

/// Dev faucet on the in-memory executor, mounted with `ENABLE_DEV_FAUCET`.
async fn mint(
    State(node): State<SharedNode>,
    Json(request): Json<MintRequest>,
) -> ApiResult<BalanceResponse> {
    if request.amount.is_zero() {
        return Err(ApiError::BadRequest("amount must be positive".to_string()));
    }
    node.executor
        .mint(request.token, request.holder, request.amount);
    Ok(Json(BalanceResponse {
        token: request.token,
        holder: request.holder,
        balance: node.executor.balance_of(request.token, request.holder),
    }))
}

pub fn router(node: SharedNode) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .route("/root", get(root))
        .route("/deposit-count", get(deposit_count))
        .route("/proof/{index}", get(proof))
        .route("/claimed/{network}/{index}", get(claimed))
        .route("/wrapped/{network}/{token}", get(wrapped))
        .route("/token-info/{wrapped}", get(token_info))
        .route("/global-exit-root/update", post(update_global_exit_root))
        .route("/global-exit-root/{hash}", get(global_exit_root))
        .route("/events", get(events))
        .route("/bridge/asset", post(bridge_asset))
        .route("/bridge/message", post(bridge_message))
        .route("/claim/asset", post(claim_asset))
        .route("/claim/message", post(claim_message))
        .route("/emergency/activate", post(activate_emergency))
        .route("/emergency/deactivate", post(deactivate_emergency));

    if node.config.enable_dev_faucet {
        router = router
            .route("/executor/mint", post(mint))
            .route("/balance/{token}/{holder}", get(balance));
    }

    router.with_state(node)
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    node: SharedNode,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> eyre::Result<()> {
    axum::serve(listener, router(node))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Start the HTTP server for the ledger API
pub async fn start_server(
    bind_address: &str,
    port: u16,
    node: SharedNode,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> eyre::Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;

    let listener = TcpListener::bind(addr).await?;
    info!("Ledger API listening on {}", addr);
    info!("  /health  - Full health status (JSON)");
    info!("  /metrics - Prometheus metrics");
    info!("  /events  - Ledger event journal");
    if node.config.admin_token.is_none() {
        warn!("ADMIN_TOKEN not set: deposit and admin routes are disabled");
    }
    if node.config.enable_dev_faucet {
        warn!("Dev faucet enabled: /executor/mint creates unbacked balances");
    }

    serve(listener, node, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::*;
    use axum::http::HeaderValue;

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_require_admin() {
        let node = Node::new(authority_config()).unwrap();
        assert!(require_admin(&node, &bearer("test-admin")).is_ok());
        assert_eq!(
            require_admin(&node, &bearer("test-admim")).unwrap_err().status(),
            StatusCode::UNAUTHORIZED
        );
        assert!(require_admin(&node, &bearer("test")).is_err());
        assert!(require_admin(&node, &HeaderMap::new()).is_err());
    }

    #[test]
    fn test_admin_disabled_without_token() {
        let mut config = authority_config();
        config.admin_token = None;
        let node = Node::new(config).unwrap();
        let err = require_admin(&node, &bearer("")).unwrap_err();
        assert_eq!(err.code(), "Unauthorized");
    }
}
