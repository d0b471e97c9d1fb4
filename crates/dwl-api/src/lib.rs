pub mod handlers;

use axum::routing::{get, post};
use axum::Router;

pub use handlers::ApiState;

/// Serves the read-only/control surface of §4.L: `GET /status`,
/// `POST /download`, `POST /suspend`, `POST /abort`, `POST /resume`.
/// Loopback-only — no CORS layer, since the only client is `dwl-ctl`.
pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/download", post(handlers::handle_download))
        .route("/suspend", post(handlers::handle_suspend))
        .route("/abort", post(handlers::handle_abort))
        .route("/resume", post(handlers::handle_resume))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "status/control surface listening on 127.0.0.1");
    axum::serve(listener, app).await?;
    Ok(())
}
