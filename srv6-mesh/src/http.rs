use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State as AxumState;
use axum::response::IntoResponse;
use axum::routing::get;
use http::StatusCode;
use tokio::net::TcpListener;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Result;

#[derive(Clone)]
struct State {
    ready: CancellationToken,
}

pub async fn serve(addr: SocketAddr, ready: CancellationToken, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("metrics listening on {}", addr);

    let state = Arc::new(State { ready });
    let app = Router::new()
        .route("/metrics", get(metrics))
        .route("/readyz", get(readyz))
        .with_state(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(cancel))
        .await?;
    Ok(())
}

pub(crate) async fn shutdown(cancel: CancellationToken) {
    select! {
        _ = cancel.cancelled() => {}
    }
}

async fn metrics(AxumState(_state): AxumState<Arc<State>>) -> String {
    let mut buffer = String::new();
    let registry = &*crate::metrics::REGISTRY.read().unwrap();
    match prometheus_client::encoding::text::encode(&mut buffer, registry) {
        Ok(_) => buffer,
        Err(_) => "".into(),
    }
}

async fn readyz(AxumState(state): AxumState<Arc<State>>) -> impl IntoResponse {
    if state.ready.is_cancelled() {
        (StatusCode::OK, "Ok")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "NotReady")
    }
}
