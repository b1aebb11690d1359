use std::io;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Request, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tokio::sync::watch::Receiver;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{
    Span, debug_span,
    field::{Empty, display},
    info, instrument,
};

use crate::reading::LatestReading;

type LatestReadingRx = Receiver<LatestReading>;

/// Build the viewer routes on top of the latest-value cell.
pub fn router(latest_rx: LatestReadingRx) -> Router {
    Router::new()
        .route("/ping", get(|| async { "OK" }))
        .route("/api/data", get(get_latest_reading))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    debug_span!("request",
                        method = %request.method(),
                        uri = %request.uri().path(),
                        status = Empty,
                    )
                })
                .on_response(|response: &Response<Body>, _: Duration, span: &Span| {
                    span.record("status", display(response.status()));
                }),
        )
        .with_state(latest_rx)
}

/// Serve the viewer API until cancelled
#[instrument(name = "api", skip_all, err)]
pub async fn serve(
    listener: TcpListener,
    latest_rx: LatestReadingRx,
    cancel: CancellationToken,
) -> io::Result<()> {
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(latest_rx))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

/// Handle `/api/data` requests
async fn get_latest_reading(State(latest_rx): State<LatestReadingRx>) -> Json<LatestReading> {
    let latest = latest_rx.borrow().clone();
    Json(latest)
}
