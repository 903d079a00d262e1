//! `GET /ws` — pushes [`super::jsonrpc::Notification`]s to a browser tab
//! as they are broadcast by the idle loop.
use super::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use log::debug;

pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay(socket, state))
}

async fn relay(mut socket: WebSocket, state: AppState) {
    let mut rx = state.notify.subscribe();
    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Ok(notification) = msg else { break };
                let Ok(text) = serde_json::to_string(&notification) else { continue };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
    debug!("websocket connection closed");
}
