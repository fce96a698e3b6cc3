use crate::actor::{CoreCommand, CoreHandle};
use crate::frames::ServerFrame;
use crate::state::AppState;
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use feedgrid_core::historical::{HistoricalQuery, HistoricalQueryError};
use rand::Rng;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// `GET /` - liveness probe the original deployment's load balancer polls.
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "hi" }))
}

/// Policy middleware run ahead of every route: rate limit, then origin and IP ban.
///
/// Ordering matters - a client over its rate limit gets a `429` regardless of origin, but a
/// client within its rate limit that fails origin/ban gets a deliberately delayed `500` rather
/// than an instant `403`, so the rejection carries no information about which policy tripped.
pub async fn policy_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    if let Some(limiter) = &state.rate_limit {
        if !limiter.check(addr.ip()) {
            return StatusCode::TOO_MANY_REQUESTS.into_response();
        }
    }

    let origin = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    let banned = state.banned.contains(&addr.ip().to_string());
    let origin_ok = state.origin.allows(origin);

    if banned || !origin_ok {
        warn!(ip = %addr.ip(), banned, origin_ok, "rejecting request on policy grounds");
        let delay_ms = rand::rng().random_range(5_000..=10_000);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    next.run(request).await
}

fn parse_markets(raw: &str) -> Vec<String> {
    raw.split('+')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(str::to_string)
        .collect()
}

async fn run_historical(
    core: &CoreHandle,
    from: String,
    to: String,
    timeframe: Option<i64>,
    markets: Vec<String>,
) -> Response {
    let (from, to) = match feedgrid_core::historical::parse_from_to(&from, &to) {
        Ok(pair) => pair,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, "missing interval").into_response();
        }
    };

    let query = HistoricalQuery {
        from,
        to,
        timeframe,
        markets,
    };

    match core.historical(query).await {
        Ok(response) => {
            let is_empty = matches!(
                &response,
                feedgrid_core::historical::HistoricalResponse::Trade(trades) if trades.is_empty()
            );
            if is_empty {
                StatusCode::NOT_FOUND.into_response()
            } else {
                Json(response).into_response()
            }
        }
        Err(HistoricalQueryError::MissingInterval) => {
            (StatusCode::BAD_REQUEST, "missing interval").into_response()
        }
        Err(error @ HistoricalQueryError::TooManyBars { .. }) => {
            (StatusCode::BAD_REQUEST, error.to_string()).into_response()
        }
        Err(HistoricalQueryError::StorageAbsent) => StatusCode::NOT_IMPLEMENTED.into_response(),
        Err(error @ HistoricalQueryError::Storage(_)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
        }
    }
}

/// `GET /historical/:from/:to`
pub async fn historical_basic(
    State(state): State<AppState>,
    Path((from, to)): Path<(String, String)>,
) -> Response {
    run_historical(&state.core, from, to, None, vec![]).await
}

/// `GET /historical/:from/:to/:timeframe`
pub async fn historical_with_timeframe(
    State(state): State<AppState>,
    Path((from, to, timeframe)): Path<(String, String, i64)>,
) -> Response {
    run_historical(&state.core, from, to, Some(timeframe), vec![]).await
}

/// `GET /historical/:from/:to/:timeframe/:markets`
pub async fn historical_with_markets(
    State(state): State<AppState>,
    Path((from, to, timeframe, markets)): Path<(String, String, i64, String)>,
) -> Response {
    run_historical(&state.core, from, to, Some(timeframe), parse_markets(&markets)).await
}

/// `GET /*path` fallback - if the API is disabled this is the only route mounted, so every
/// request (including would-be websocket upgrades) resolves here with `501`. When the API is
/// enabled this additionally serves as the websocket subscription endpoint: the path tail is the
/// `+`-delimited pair list the spec's client session manager expects.
pub async fn websocket_or_disabled(
    ws: Option<WebSocketUpgrade>,
    State(state): State<AppState>,
    axum::extract::OriginalUri(uri): axum::extract::OriginalUri,
) -> Response {
    match ws {
        Some(ws) => {
            let path = uri.path().to_string();
            ws.on_upgrade(move |socket| handle_socket(socket, state, path))
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_socket(socket: axum::extract::ws::WebSocket, state: AppState, path: String) {
    use axum::extract::ws::Message;
    use futures_util::{SinkExt, StreamExt};

    let id = state.next_client_id();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
    state.core.send(CoreCommand::ClientConnect { id, path, tx });

    let (mut sink, mut stream) = socket.split();

    let mut outbound = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut outbound => break,
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        state.core.send(CoreCommand::ClientResubscribe { id, message: text });
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(frame) = &frame {
                            log_close_code(frame.code);
                        }
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
        }
    }

    outbound.abort();
    state.core.send(CoreCommand::ClientDisconnect { id });
}

/// Logs unusual WebSocket close codes with a human-readable label, per the client session
/// manager's close-handling contract.
fn log_close_code(code: u16) {
    let label = match code {
        1002 => Some("protocol error"),
        1003 => Some("unsupported data"),
        1007 => Some("invalid frame payload data"),
        1008 => Some("policy violation"),
        1009 => Some("message too big"),
        1010 => Some("mandatory extension"),
        1011 => Some("internal error"),
        1012 => Some("service restart"),
        1013 => Some("try again later"),
        1014 => Some("bad gateway"),
        1015 => Some("TLS handshake failure"),
        _ => None,
    };

    if let Some(label) = label {
        warn!(code, label, "broadcast client closed with an unusual close code");
    }
}
