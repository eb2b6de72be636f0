//! kubescale-api — REST API for KubeScale.
//!
//! A thin mapping of the platform's boundary operations onto HTTP. Reads
//! are served from snapshots, so a response never mixes two ticks.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Cluster mode, tick and object counts |
//! | GET | `/api/v1/tenants` | List tenants |
//! | POST | `/api/v1/tenants` | Create a tenant |
//! | GET | `/api/v1/workloads?tenant=` | List workloads |
//! | POST | `/api/v1/workloads` | Deploy a workload |
//! | GET | `/api/v1/workloads/{id}/traffic` | Traffic history |
//! | GET | `/api/v1/pods?workload=` | List pods |
//! | POST | `/api/v1/predictions` | Submit a traffic prediction |
//! | GET | `/api/v1/state` | Whole snapshot |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;
pub mod prometheus;

use axum::Router;
use axum::routing::{get, post};
use kubescale_reconciler::Platform;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub platform: Platform,
}

/// Build the complete API router.
pub fn build_router(platform: Platform) -> Router {
    let state = ApiState { platform };

    let api_routes = Router::new()
        .route("/tenants", get(handlers::list_tenants).post(handlers::create_tenant))
        .route("/workloads", get(handlers::list_workloads).post(handlers::deploy_workload))
        .route("/workloads/{id}/traffic", get(handlers::traffic_history))
        .route("/pods", get(handlers::list_pods))
        .route("/predictions", post(handlers::submit_prediction))
        .route("/state", get(handlers::get_state))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health).with_state(state.clone()))
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
