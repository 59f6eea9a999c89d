// src/ws.rs
use crate::types::{IncomingMessage, OutgoingMessage, TagCommand};
use crossbeam_channel::Sender;
use futures::{SinkExt, StreamExt};
use log::warn;
use std::sync::Arc;
use tokio::sync::broadcast;
use warp::Filter;

pub async fn start_server(
    cmd_tx: Sender<TagCommand>,
    mut event_rx: broadcast::Receiver<OutgoingMessage>,
) {
    // Shared broadcast channel for WS clients
    let (ws_tx, _) = broadcast::channel::<OutgoingMessage>(32);
    let ws_tx = Arc::new(ws_tx);

    // Forward coordinator events to all connected clients.
    let ws_tx_clone = ws_tx.clone();
    tokio::spawn(async move {
        while let Ok(msg) = event_rx.recv().await {
            let _ = ws_tx_clone.send(msg);
        }
    });

    let ws_route = warp::path::end()
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let cmd_tx = cmd_tx.clone();
            let ws_tx = ws_tx.clone();
            ws.on_upgrade(move |socket| handle_connection(socket, cmd_tx, ws_tx))
        });

    let routes = ws_route.with(warp::cors().allow_any_origin());

    println!("WebSocket server running on ws://127.0.0.1:3500");
    warp::serve(routes).run(([127, 0, 0, 1], 3500)).await;
}

async fn handle_connection(
    ws: warp::ws::WebSocket,
    cmd_tx: Sender<TagCommand>,
    ws_tx: Arc<broadcast::Sender<OutgoingMessage>>,
) {
    let (mut client_ws_tx, mut client_ws_rx) = ws.split();
    let mut rx_broadcast = ws_tx.subscribe();

    // Broadcasts -> this client
    tokio::spawn(async move {
        while let Ok(msg) = rx_broadcast.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(err) => {
                    warn!("Dropping unserializable event: {}", err);
                    continue;
                }
            };
            if client_ws_tx
                .send(warp::ws::Message::text(json))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Client requests -> coordinator commands
    while let Some(result) = client_ws_rx.next().await {
        let Ok(msg) = result else { break };
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_str() else { continue };
        match serde_json::from_str::<IncomingMessage>(text) {
            Ok(parsed) => {
                let _ = cmd_tx.send(command_for(parsed));
            }
            Err(err) => warn!("Ignoring malformed client message: {}", err),
        }
    }
}

fn command_for(msg: IncomingMessage) -> TagCommand {
    match msg {
        IncomingMessage::GET_READER_STATUS => TagCommand::CheckReaderStatus,
        IncomingMessage::REQUEST_SCAN => TagCommand::Scan,
        IncomingMessage::WRITE_TEXT { content } => TagCommand::WriteText { content },
        IncomingMessage::WRITE_URL { url } => TagCommand::WriteUrl { url },
        IncomingMessage::DELETE_TAG => TagCommand::Delete,
    }
}
