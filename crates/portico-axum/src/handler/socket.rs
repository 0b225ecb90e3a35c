/* crates/portico-axum/src/handler/socket.rs */

// Websocket views. The upgrade handshake hands the connection to the view's
// stream handler; every yielded value is forwarded to the client as a JSON
// text frame, errors included, and the stream ending closes the socket.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query};
use axum::routing::{MethodRouter, get};
use portico_server::{BoundSocket, SocketHandlerFn, Verb, ViewError, ViewRequest};
use tokio_stream::StreamExt;

pub(crate) fn socket_method_router(socket: Arc<BoundSocket>) -> MethodRouter {
  get(
    move |Path(path_params): Path<HashMap<String, String>>,
          Query(query): Query<HashMap<String, String>>,
          ws: WebSocketUpgrade| {
      let socket = socket.clone();
      async move {
        let mut input = serde_json::Map::new();
        for (key, value) in &query {
          input.insert(key.clone(), serde_json::Value::String(value.clone()));
        }
        let request = ViewRequest {
          verb: Verb::Get,
          path_params,
          input: serde_json::Value::Object(input),
          user: None,
          capabilities: portico_server::CapabilitySet::default(),
        };
        let handler = socket.handler.clone();
        let name = socket.name.clone();
        ws.on_upgrade(move |conn| forward(conn, handler, request, name))
      }
    },
  )
}

async fn forward(mut conn: WebSocket, handler: SocketHandlerFn, request: ViewRequest, name: String) {
  let mut stream = match (handler)(request).await {
    Ok(stream) => stream,
    Err(err) => {
      let _ = conn.send(Message::Text(error_frame(&err).into())).await;
      let _ = conn.send(Message::Close(None)).await;
      return;
    }
  };

  while let Some(item) = stream.next().await {
    let frame = match item {
      Ok(value) => value.to_string(),
      Err(err) => {
        tracing::warn!(view = %name, error = %err, "websocket stream error");
        error_frame(&err)
      }
    };
    if conn.send(Message::Text(frame.into())).await.is_err() {
      // Client went away; stop draining the stream.
      return;
    }
  }
  let _ = conn.send(Message::Close(None)).await;
}

fn error_frame(err: &ViewError) -> String {
  serde_json::json!({
    "error_code": err.code(),
    "error_message": err.message(),
  })
  .to_string()
}
