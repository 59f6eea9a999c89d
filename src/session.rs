// src/session.rs
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};

use crate::classify::classify;
use crate::hexfmt::format_hex;
use crate::ndef::{self, NdefRecord};
use crate::radio::{Radio, SessionError, TagHandle, UrlOpener};
use crate::types::{
    KEY_ATQA, KEY_DATA_FORMAT, KEY_DETECTED_URL, KEY_MEMORY, KEY_SAK, KEY_SERIAL, KEY_SIZE,
    KEY_TAG_TYPE, KEY_TECHNOLOGIES, OutgoingMessage, ScanResult, TagCommand,
};

/// Delay before a detected URL is handed to the opener, so the result view
/// settles first. Fire-and-forget: teardown does not cancel it.
const URL_OPEN_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Detecting,
    Connected,
    Classified,
    ReadingNdef,
    Writing,
    Deleting,
    Reporting,
}

/// Drives one tag session at a time: detect, classify, read or write,
/// report, invalidate. Owns the ScanResult for the duration of a scan.
pub struct Coordinator<R: Radio> {
    radio: R,
    tx: Sender<OutgoingMessage>,
    opener: Arc<dyn UrlOpener>,
    state: SessionState,
    result: ScanResult,
    url_open_delay: Duration,
}

impl<R: Radio> Coordinator<R> {
    pub fn new(radio: R, tx: Sender<OutgoingMessage>, opener: Arc<dyn UrlOpener>) -> Self {
        Self {
            radio,
            tx,
            opener,
            state: SessionState::Idle,
            result: ScanResult::new(),
            url_open_delay: URL_OPEN_DELAY,
        }
    }

    #[cfg(test)]
    fn with_url_open_delay(mut self, delay: Duration) -> Self {
        self.url_open_delay = delay;
        self
    }

    /// Blocking command loop; runs on its own OS thread.
    pub fn run(mut self, rx: Receiver<TagCommand>) {
        info!("Tag session coordinator running");
        while let Ok(cmd) = rx.recv() {
            self.handle_command(cmd);
        }
    }

    pub fn handle_command(&mut self, cmd: TagCommand) {
        match cmd {
            TagCommand::Scan => self.scan(),
            TagCommand::WriteText { content } => self.write_message(
                vec![NdefRecord::Text {
                    content,
                    language: "en".into(),
                }],
                SessionState::Writing,
            ),
            TagCommand::WriteUrl { url } => {
                self.write_message(vec![NdefRecord::Uri(url)], SessionState::Writing)
            }
            TagCommand::Delete => self.write_message(Vec::new(), SessionState::Deleting),
            TagCommand::CheckReaderStatus => {
                let success = self.radio.reader_available();
                let _ = self.tx.send(OutgoingMessage::READER_STATUS { success });
            }
        }
    }

    fn scan(&mut self) {
        // Overwrite-on-clear: nothing from the previous scan survives.
        self.result.clear();
        self.set_state(SessionState::Detecting);

        let outcome = self.perform_scan();
        self.set_state(SessionState::Reporting);

        match outcome {
            Ok(()) => {
                let _ = self.tx.send(OutgoingMessage::SCAN_RESULT {
                    fields: self.result.clone(),
                });
            }
            Err(err) => {
                warn!("Scan failed: {}", err);
                let _ = self.tx.send(OutgoingMessage::SCAN_ERROR {
                    error: err.to_string(),
                });
            }
        }

        // Unconditional teardown, success or not.
        self.radio.invalidate();
        self.set_state(SessionState::Idle);
    }

    fn perform_scan(&mut self) -> Result<(), SessionError> {
        let mut tag = self.radio.await_tag()?;
        let _ = self.tx.send(OutgoingMessage::TAG_STATUS {
            success: true,
            message: "Tag detected!".into(),
        });

        self.set_state(SessionState::Connected);
        tag.connect()?;

        self.set_state(SessionState::Classified);
        let identity = tag.identity().clone();
        let meta = classify(&identity);
        self.result.set(KEY_TAG_TYPE, meta.tag_type);
        self.result.set(KEY_TECHNOLOGIES, meta.technologies);
        self.result.set(KEY_SERIAL, meta.serial);
        self.result.set(KEY_ATQA, meta.atqa);
        self.result.set(KEY_SAK, meta.sak);
        self.result.set(KEY_MEMORY, meta.memory);
        self.result.set(KEY_DATA_FORMAT, meta.data_format);

        if !identity.family.supports_ndef() {
            // Label-only result; no NDEF application to talk to.
            return Ok(());
        }

        self.set_state(SessionState::ReadingNdef);
        self.read_ndef(tag.as_mut())
    }

    fn read_ndef(&mut self, tag: &mut dyn TagHandle) -> Result<(), SessionError> {
        let status = match tag.ndef_status() {
            Ok(status) => status,
            Err(SessionError::NotNdefCapable) => {
                self.result.set(KEY_DATA_FORMAT, "Non-NDEF");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if !status.ndef_present {
            self.result.set(KEY_DATA_FORMAT, "Empty");
            self.result
                .set(KEY_SIZE, format!("{} Bytes", status.capacity));
            return Ok(());
        }

        let raw = tag.read_raw()?;
        let records = ndef::decode(&raw)?;

        self.result
            .set(KEY_DATA_FORMAT, if records.is_empty() { "Empty" } else { "NDEF" });
        self.result
            .set(KEY_SIZE, format!("{} / {} Bytes", raw.len(), status.capacity));

        for (index, record) in records.iter().enumerate() {
            // 1-based, wire order.
            self.result
                .set(&format!("Record {}", index + 1), render_record(record));

            if let NdefRecord::Uri(url) = record {
                self.result.set(KEY_DETECTED_URL, url.clone());
                self.schedule_url_open(url.clone());
            }
        }

        Ok(())
    }

    fn write_message(&mut self, records: Vec<NdefRecord>, write_state: SessionState) {
        self.result.clear();
        self.set_state(SessionState::Detecting);

        let outcome = self.perform_write(&records, write_state);
        self.set_state(SessionState::Reporting);

        match outcome {
            Ok(()) => {
                let message = if write_state == SessionState::Deleting {
                    "Tag cleared!"
                } else {
                    "Data written successfully!"
                };
                let _ = self.tx.send(OutgoingMessage::WRITE_SUCCESS {
                    message: message.into(),
                });
            }
            Err(err) => {
                warn!("Write failed: {}", err);
                let _ = self.tx.send(OutgoingMessage::WRITE_ERROR {
                    error: err.to_string(),
                });
            }
        }

        self.radio.invalidate();
        self.set_state(SessionState::Idle);
    }

    fn perform_write(
        &mut self,
        records: &[NdefRecord],
        write_state: SessionState,
    ) -> Result<(), SessionError> {
        let mut tag = self.radio.await_tag()?;
        let _ = self.tx.send(OutgoingMessage::TAG_STATUS {
            success: true,
            message: "Tag detected!".into(),
        });

        self.set_state(SessionState::Connected);
        tag.connect()?;

        // Writability check happens before any write is attempted.
        let status = tag.ndef_status()?;
        if !status.writable {
            return Err(SessionError::NotWritable);
        }

        self.set_state(write_state);
        let raw = ndef::encode_message(records);
        if raw.len() > status.capacity {
            return Err(SessionError::CapacityExceeded {
                payload: raw.len(),
                capacity: status.capacity,
            });
        }

        tag.write_raw(&raw)
    }

    fn schedule_url_open(&self, url: String) {
        let opener = Arc::clone(&self.opener);
        let delay = self.url_open_delay;
        // No cancellation token: if the session is torn down first, the open
        // still fires. Known gap, matches the shipped behavior.
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            opener.open(&url);
        });
    }

    fn set_state(&mut self, next: SessionState) {
        debug!("session state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

fn render_record(record: &NdefRecord) -> String {
    match record {
        NdefRecord::Text { content, .. } => content.clone(),
        NdefRecord::Uri(url) => url.clone(),
        NdefRecord::Binary(raw) => format_hex(raw),
    }
}
