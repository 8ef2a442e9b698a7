//! Connection handlers for the Parley server.
//!
//! This module owns the socket lifecycle: it attaches each socket to the
//! hub, feeds decoded client events to the registry, and drains the
//! connection's outbound queue back onto the socket.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parley_core::{ConnectionId, Hub, Registry};
use parley_protocol::{codec, ClientEvent, ProtocolError, ServerEvent};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Presence and routing registry.
    pub registry: Registry<Hub>,
    /// Channel layer the registry routes through.
    pub hub: Arc<Hub>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state with an empty registry.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let hub = Arc::new(Hub::new());
        Self {
            registry: Registry::new(Arc::clone(&hub)),
            hub,
            config,
        }
    }
}

/// How outbound events are encoded for a socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// JSON text frames.
    #[default]
    Json,
    /// Length-prefixed MessagePack binary frames.
    Msgpack,
}

/// Query parameters accepted on the WebSocket endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SocketParams {
    #[serde(default)]
    pub format: WireFormat,
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors.allowed_origins);

    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Parley server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    let state = Arc::new(AppState::new(config));
    serve(listener, state, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// The registry is cleared once the server has stopped.
///
/// # Errors
///
/// Returns an error if serving fails.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown)
        .await?;

    state.registry.clear();
    info!("Parley server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "users": state.registry.len(),
        "connections": state.hub.stats().connections,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<SocketParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, params.format))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, format: WireFormat) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ConnectionId::generate();
    let mut outbound = state.hub.connect(connection_id.clone());
    metrics::set_active_rooms(state.hub.stats().rooms);

    debug!(connection = %connection_id, ?format, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    let hello = ServerEvent::Connected {
        id: connection_id.to_string(),
    };
    if let Err(e) = send_event(&mut sender, format, &hello).await {
        error!(connection = %connection_id, error = %e, "Failed to send connected event");
        disconnect(&state, &connection_id);
        return;
    }

    // Read buffer for partial binary frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            // Events routed to this connection by the registry
            Some(event) = outbound.recv() => {
                if let Err(e) = send_event(&mut sender, format, &event).await {
                    debug!(connection = %connection_id, error = %e, "Outbound send failed");
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_bytes(text.len(), "inbound");
                        match codec::decode_text::<ClientEvent>(&text) {
                            Ok(event) => dispatch(&state, &connection_id, event),
                            Err(e) => {
                                warn!(connection = %connection_id, error = %e, "Undecodable text frame");
                                metrics::record_error("decode");
                            }
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        metrics::record_bytes(data.len(), "inbound");
                        read_buffer.extend_from_slice(&data);
                        drain_binary(&mut read_buffer, &connection_id, |event| {
                            dispatch(&state, &connection_id, event)
                        });
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    disconnect(&state, &connection_id);
    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Decode every complete frame buffered so far, handing each event on.
///
/// A frame that fails to decode is skipped and the frames after it are
/// still delivered. An oversized length prefix loses the frame boundary,
/// so the buffer is discarded. Returns the number of events delivered.
fn drain_binary(
    read_buffer: &mut BytesMut,
    connection_id: &ConnectionId,
    mut on_event: impl FnMut(ClientEvent),
) -> usize {
    let mut delivered = 0;

    loop {
        match codec::decode_from::<ClientEvent>(read_buffer) {
            Ok(Some(event)) => {
                on_event(event);
                delivered += 1;
            }
            Ok(None) => break,
            Err(e @ ProtocolError::Decode(_)) => {
                warn!(connection = %connection_id, error = %e, "Skipping undecodable binary frame");
                metrics::record_error("decode");
            }
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "Discarding binary read buffer");
                metrics::record_error("decode");
                break;
            }
        }
    }

    delivered
}

/// Hand a decoded client event to the registry.
fn dispatch(state: &AppState, connection_id: &ConnectionId, event: ClientEvent) {
    let start = Instant::now();
    let name = event.name();
    let is_register = matches!(event, ClientEvent::Register(_));
    let is_join = matches!(event, ClientEvent::JoinRoom(_));

    metrics::record_event(name, "inbound");

    match state.registry.handle(connection_id, event) {
        Ok(()) if is_register => metrics::set_registered_users(state.registry.len()),
        Ok(()) if is_join => metrics::set_active_rooms(state.hub.stats().rooms),
        Ok(()) => {}
        Err(_) => metrics::record_rejected_registration(),
    }

    metrics::record_latency(start.elapsed().as_secs_f64());
}

/// Detach a connection from the hub, then drop its registration.
fn disconnect(state: &AppState, connection_id: &ConnectionId) {
    state.hub.disconnect(connection_id);
    if state.registry.deregister(connection_id).is_some() {
        metrics::set_registered_users(state.registry.len());
    }
    metrics::set_active_rooms(state.hub.stats().rooms);
}

/// Encode an event and write it to the socket.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    format: WireFormat,
    event: &ServerEvent,
) -> Result<()> {
    let message = match format {
        WireFormat::Json => {
            let text = codec::encode_text(event)?;
            metrics::record_bytes(text.len(), "outbound");
            Message::Text(text)
        }
        WireFormat::Msgpack => {
            let data = codec::encode(event)?;
            metrics::record_bytes(data.len(), "outbound");
            Message::Binary(data.to_vec())
        }
    };

    metrics::record_event(event.name(), "outbound");
    sender.send(message).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_drain_binary_skips_bad_frame() {
        let connection: ConnectionId = "conn-1".into();
        let mut buf = BytesMut::new();
        // 0xc1 is never valid MessagePack
        buf.put_slice(&frame(&[0xc1]));
        buf.extend_from_slice(&codec::encode(&ClientEvent::JoinRoom("lobby".into())).unwrap());
        buf.extend_from_slice(&codec::encode(&ClientEvent::Register("alice".into())).unwrap());

        let mut events = Vec::new();
        let delivered = drain_binary(&mut buf, &connection, |event| events.push(event));

        assert_eq!(delivered, 2);
        assert_eq!(
            events,
            vec![
                ClientEvent::JoinRoom("lobby".into()),
                ClientEvent::Register("alice".into()),
            ]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_drain_binary_keeps_partial_frame() {
        let connection: ConnectionId = "conn-1".into();
        let encoded = codec::encode(&ClientEvent::JoinRoom("lobby".into())).unwrap();
        let mut buf = BytesMut::from(&encoded[..encoded.len() - 1]);

        assert_eq!(drain_binary(&mut buf, &connection, |_| {}), 0);
        assert_eq!(buf.len(), encoded.len() - 1);

        buf.extend_from_slice(&encoded[encoded.len() - 1..]);
        assert_eq!(drain_binary(&mut buf, &connection, |_| {}), 1);
    }

    #[test]
    fn test_drain_binary_discards_oversized_frame() {
        let connection: ConnectionId = "conn-1".into();
        let mut buf = BytesMut::new();
        buf.put_u32(u32::MAX);
        buf.extend_from_slice(&codec::encode(&ClientEvent::JoinRoom("lobby".into())).unwrap());

        assert_eq!(drain_binary(&mut buf, &connection, |_| {}), 0);
        assert!(buf.is_empty());
    }
}
