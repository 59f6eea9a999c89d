mod apdu;
mod classify;
mod hexfmt;
mod ndef;
mod pcsc_radio;
mod radio;
mod session;
mod types;
mod ws;

use std::sync::Arc;

use crossbeam_channel::{Sender, unbounded};
use log::{error, info};
use tokio::sync::broadcast;

use crate::radio::UrlOpener;
use crate::types::{OutgoingMessage, TagCommand};

/// Default browser-open collaborator: hands the URL to the frontend, which
/// owns the actual browser.
struct EventUrlOpener {
    tx: Sender<OutgoingMessage>,
}

impl UrlOpener for EventUrlOpener {
    fn open(&self, url: &str) {
        info!("Opening detected URL: {}", url);
        let _ = self.tx.send(OutgoingMessage::OPEN_URL {
            url: url.to_string(),
        });
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    println!("Starting tag scanner service...");

    // Channel: WS -> coordinator (commands). Crossbeam, because the
    // coordinator runs on a blocking OS thread.
    let (cmd_tx, cmd_rx) = unbounded::<TagCommand>();

    // Channel: coordinator -> WS (events), fanned out to clients.
    let (event_tx, event_rx) = broadcast::channel::<OutgoingMessage>(100);

    // Bridge: coordinator sends sync, broadcast distributes async-side.
    let (bridge_tx, bridge_rx) = unbounded::<OutgoingMessage>();
    let event_tx_clone = event_tx.clone();
    std::thread::spawn(move || {
        while let Ok(msg) = bridge_rx.recv() {
            let _ = event_tx_clone.send(msg);
        }
    });

    // Coordinator thread (blocking PC/SC calls).
    let coordinator_tx = bridge_tx.clone();
    std::thread::spawn(move || {
        let radio = match pcsc_radio::PcscRadio::new() {
            Ok(radio) => radio,
            Err(err) => {
                error!("Failed to establish PC/SC context: {}", err);
                let _ = coordinator_tx.send(OutgoingMessage::READER_ERROR {
                    error: err.to_string(),
                });
                return;
            }
        };
        let opener = Arc::new(EventUrlOpener {
            tx: coordinator_tx.clone(),
        });
        session::Coordinator::new(radio, coordinator_tx, opener).run(cmd_rx);
    });

    ws::start_server(cmd_tx, event_rx).await;
}
