//! Download sequencer: requests chunks in order and reassembles the file.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use nofile_connection::{Connector, TransportSession};
use nofile_protocol::constants::{FALLBACK_CONTENT_TYPE, FALLBACK_FILE_NAME};
use nofile_protocol::{
    DownloadRequest, DownloadResponse, EndedRequest, TransferState, encode_frame,
};
use nofile_transfer::{
    NONCE_PREFIX_LEN, SecretKey, decrypt_chunk, key_from_link, sanitize_file_name, split_nonce,
};

use crate::config::ClientConfig;
use crate::error::TransferError;
use crate::events::{EventSink, TransferEvent, TransferId};
use crate::upload::retry_reporter;

/// What to download.
#[derive(Debug, Clone)]
pub struct DownloadSpec {
    /// Share link; the key is read from its fragment.
    pub link: String,
    /// Chunk count declared by the download page.
    pub total: u32,
    pub password: Option<String>,
    /// The page says the file is password protected.
    pub password_required: bool,
}

impl DownloadSpec {
    pub fn new(link: impl Into<String>, total: u32) -> Self {
        Self {
            link: link.into(),
            total,
            password: None,
            password_required: false,
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn password_required(mut self, required: bool) -> Self {
        self.password_required = required;
        self
    }
}

/// The reassembled plaintext and its declared metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Drives one download from the first request to the assembled file.
pub struct DownloadSequencer {
    id: TransferId,
    key: SecretKey,
    total: u32,
    password: Option<String>,
    session: TransportSession,
    events: EventSink,
    cancel: CancellationToken,
    state: TransferState,
    /// Verified plaintext, in index order. Grows as chunks arrive.
    chunks: Vec<Vec<u8>>,
    /// Base-nonce prefix every chunk of the file must share.
    nonce_prefix: Option<[u8; NONCE_PREFIX_LEN]>,
    name: Option<String>,
    content_type: Option<String>,
}

impl DownloadSequencer {
    pub fn new(
        id: TransferId,
        spec: DownloadSpec,
        config: &ClientConfig,
        connector: Arc<dyn Connector>,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<Self, TransferError> {
        if spec.password_required && spec.password.is_none() {
            return Err(TransferError::PasswordRequired);
        }
        if spec.total == 0 {
            return Err(TransferError::Config("download has no chunks".into()));
        }
        let key = key_from_link(&spec.link)?;

        let mut session = TransportSession::new(
            connector,
            config.candidates(),
            config.transport.clone(),
            cancel.clone(),
        )
        .with_label(format!("download-{id}"));
        session.set_retry_callback(retry_reporter(id, events.clone()));

        Ok(Self {
            id,
            key,
            total: spec.total,
            password: spec.password,
            session,
            events,
            cancel,
            state: TransferState::Pending,
            chunks: Vec::new(),
            nonce_prefix: None,
            name: None,
            content_type: None,
        })
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Runs the download to a terminal state and closes the channel.
    pub async fn run(mut self) -> Result<DownloadedFile, TransferError> {
        info!(transfer = self.id, chunks = self.total, "download started");
        let result = self.drive().await;
        self.session.close();

        match &result {
            Ok(file) => {
                self.set_state(TransferState::Complete);
                info!(
                    transfer = self.id,
                    name = %file.name,
                    size = file.bytes.len(),
                    "download complete"
                );
                self.events
                    .emit(TransferEvent::download_finalized(self.id, file));
            }
            Err(e) if e.is_cancelled() => {
                self.set_state(TransferState::Cancelled);
                info!(transfer = self.id, "download cancelled");
            }
            Err(e) => {
                self.set_state(TransferState::Failed);
                error!(transfer = self.id, error = %e, "download failed");
                if let Some(notice) = e.notice() {
                    self.events.emit(TransferEvent::Failed {
                        transfer: self.id,
                        notice,
                    });
                }
            }
        }
        result
    }

    async fn drive(&mut self) -> Result<DownloadedFile, TransferError> {
        self.set_state(TransferState::Connecting);
        self.session.open().await?;

        for index in 0..self.total {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            let request = DownloadRequest {
                part: index,
                file_pwd: self.password.clone(),
            };
            let frame = encode_frame(&request, None)?;

            self.set_state(TransferState::AwaitingChunk);
            let response: DownloadResponse = self.session.request(&frame, index).await?;

            self.set_state(TransferState::ProcessingChunk);
            self.accept(index, response)?;
            debug!(transfer = self.id, chunk = index, total = self.total, "chunk received");
            self.events.emit(TransferEvent::Progress {
                transfer: self.id,
                completed: index + 1,
                total: self.total,
            });
        }

        let ended = encode_frame(&EndedRequest::new(self.password.clone()), None)?;
        self.session.notify(&ended).await;
        self.assemble()
    }

    /// Verifies and stores one chunk. Nothing is kept unless the tag verifies.
    fn accept(&mut self, index: u32, response: DownloadResponse) -> Result<(), TransferError> {
        if let Some(msg) = response.rejection() {
            warn!(transfer = self.id, chunk = index, error = %msg, "download rejected by remote");
            return Err(TransferError::ServerRejection(msg.to_string()));
        }
        if response.meta.part.is_none() {
            return Err(TransferError::ProtocolViolation(format!(
                "response for chunk {index} carries no index"
            )));
        }
        if let Some(total) = response.meta.total
            && total != self.total
        {
            return Err(TransferError::ProtocolViolation(format!(
                "remote reports {total} chunks, expected {}",
                self.total
            )));
        }
        let payload = response.payload.ok_or_else(|| {
            TransferError::ProtocolViolation(format!("chunk {index} has no payload"))
        })?;
        payload.check_alg()?;

        // The nonce binds the ciphertext to its position in the file.
        let (prefix, sealed_as) =
            split_nonce(&payload.iv).map_err(|e| TransferError::from_codec(index, e))?;
        if sealed_as != index {
            return Err(TransferError::ProtocolViolation(format!(
                "chunk {index} was sealed as chunk {sealed_as}"
            )));
        }
        if self.nonce_prefix.is_some_and(|p| p != prefix) {
            return Err(TransferError::ProtocolViolation(format!(
                "chunk {index} was sealed for another file"
            )));
        }

        let plaintext = decrypt_chunk(&self.key, &payload.iv, &payload.ct)
            .map_err(|e| TransferError::from_codec(index, e))?;
        self.nonce_prefix = Some(prefix);

        if self.name.is_none() {
            self.name = response.meta.name.filter(|n| !n.is_empty());
        }
        if self.content_type.is_none() {
            self.content_type = response.meta.content_type.filter(|t| !t.is_empty());
        }
        if self.chunks.len() != index as usize {
            return Err(TransferError::ProtocolViolation(format!(
                "chunk {index} arrived out of order"
            )));
        }
        self.chunks.push(plaintext);
        Ok(())
    }

    fn assemble(&mut self) -> Result<DownloadedFile, TransferError> {
        if self.chunks.len() != self.total as usize {
            return Err(TransferError::ProtocolViolation(format!(
                "received {} of {} chunks",
                self.chunks.len(),
                self.total
            )));
        }
        let bytes = std::mem::take(&mut self.chunks).concat();

        // The declared name comes from the remote; keep only a bare file name.
        let name = self
            .name
            .take()
            .and_then(|n| sanitize_file_name(&n).ok())
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
        let content_type = self
            .content_type
            .take()
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
        Ok(DownloadedFile {
            name,
            content_type,
            bytes,
        })
    }

    fn set_state(&mut self, state: TransferState) {
        if self.state == state {
            return;
        }
        debug!(transfer = self.id, from = ?self.state, to = ?state, "state change");
        self.state = state;
        self.events.emit(TransferEvent::StateChanged {
            transfer: self.id,
            state,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DownloadRemote, collect_events, spawn_download_remote};
    use nofile_connection::MemoryConnector;
    use nofile_transfer::TransferKey;

    fn config() -> ClientConfig {
        ClientConfig {
            ws_url: "ws://files.test/download/".into(),
            base_url: "http://files.test/".into(),
            ..ClientConfig::default()
        }
    }

    fn key() -> TransferKey {
        TransferKey::from_parts([3; 32], [9; 12])
    }

    fn link(key: &TransferKey) -> String {
        format!("http://files.test/r/aZ9#{}", key.encoded_key())
    }

    fn sequencer(
        connector: &MemoryConnector,
        spec: DownloadSpec,
    ) -> (DownloadSequencer, tokio::sync::mpsc::Receiver<TransferEvent>) {
        cancellable_sequencer(connector, spec, CancellationToken::new())
    }

    fn cancellable_sequencer(
        connector: &MemoryConnector,
        spec: DownloadSpec,
        cancel: CancellationToken,
    ) -> (DownloadSequencer, tokio::sync::mpsc::Receiver<TransferEvent>) {
        let (events, rx) = EventSink::channel();
        let seq = DownloadSequencer::new(
            1,
            spec,
            &config(),
            Arc::new(connector.clone()),
            events,
            cancel,
        )
        .unwrap();
        (seq, rx)
    }

    #[tokio::test]
    async fn single_chunk_download() {
        let (connector, listener) = MemoryConnector::new();
        let remote = spawn_download_remote(
            listener,
            DownloadRemote::new(key(), b"hello, world".to_vec(), 1024),
        );
        let (seq, mut rx) = sequencer(&connector, DownloadSpec::new(link(&key()), 1));

        let file = seq.run().await.unwrap();
        assert_eq!(file.bytes, b"hello, world");
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.content_type, "text/plain");

        // One request, then the terminal frame.
        remote.wait_disconnects(1).await;
        let frames = remote.frames();
        assert_eq!(frames, vec![r#"{"part":0}"#, r#"{"ended":true}"#]);
        assert_eq!(remote.ended(), 1);

        let events = collect_events(&mut rx);
        assert!(events.contains(&TransferEvent::Progress {
            transfer: 1,
            completed: 1,
            total: 1,
        }));
        assert!(matches!(
            events.last(),
            Some(TransferEvent::DownloadFinalized { size: 12, .. })
        ));
    }

    #[tokio::test]
    async fn multi_chunk_download_in_order() {
        let (connector, listener) = MemoryConnector::new();
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 256) as u8).collect();
        let remote = spawn_download_remote(listener, DownloadRemote::new(key(), data.clone(), 1000));
        let spec = DownloadSpec::new(link(&key()), 3).with_password(Some("pw".into()));
        let (seq, _rx) = sequencer(&connector, spec);

        let file = seq.run().await.unwrap();
        assert_eq!(file.bytes, data);
        remote.wait_disconnects(1).await;
        assert!(remote.never_pipelined());
        assert_eq!(
            remote.frames(),
            vec![
                r#"{"part":0,"file_pwd":"pw"}"#,
                r#"{"part":1,"file_pwd":"pw"}"#,
                r#"{"part":2,"file_pwd":"pw"}"#,
                r#"{"ended":true,"file_pwd":"pw"}"#,
            ]
        );
    }

    #[tokio::test]
    async fn rejection_fails_immediately() {
        let (connector, listener) = MemoryConnector::new();
        let mut script = DownloadRemote::new(key(), b"secret".to_vec(), 1024);
        script.reject_with = Some("password required".into());
        let remote = spawn_download_remote(listener, script);
        let (seq, mut rx) = sequencer(&connector, DownloadSpec::new(link(&key()), 1));

        let err = seq.run().await.unwrap_err();
        assert!(matches!(&err, TransferError::ServerRejection(m) if m == "password required"));
        assert_eq!(connector.attempts().len(), 1);
        assert_eq!(remote.frames().len(), 1);

        let events = collect_events(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, TransferEvent::Retrying { .. })));
        assert!(events.contains(&TransferEvent::StateChanged {
            transfer: 1,
            state: TransferState::Failed,
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            TransferEvent::Failed { notice, .. } if notice.message == "password required"
        )));
    }

    #[tokio::test]
    async fn tampered_chunk_is_fatal() {
        let (connector, listener) = MemoryConnector::new();
        let mut script = DownloadRemote::new(key(), vec![5; 3000], 1000);
        script.tamper = Some(1);
        let remote = spawn_download_remote(listener, script);
        let (seq, _rx) = sequencer(&connector, DownloadSpec::new(link(&key()), 3));

        let err = seq.run().await.unwrap_err();
        assert!(matches!(err, TransferError::Authentication { chunk: 1 }));
        // No request after the bad chunk, and no terminal frame.
        remote.wait_disconnects(1).await;
        assert_eq!(remote.frames().len(), 2);
        assert_eq!(remote.ended(), 0);
    }

    #[tokio::test]
    async fn wrong_key_is_authentication_failure() {
        let (connector, listener) = MemoryConnector::new();
        spawn_download_remote(listener, DownloadRemote::new(key(), vec![1; 10], 1024));
        let other = TransferKey::from_parts([4; 32], [9; 12]);
        let (seq, _rx) = sequencer(&connector, DownloadSpec::new(link(&other), 1));

        assert!(matches!(
            seq.run().await,
            Err(TransferError::Authentication { chunk: 0 })
        ));
    }

    #[tokio::test]
    async fn declared_total_mismatch_is_violation() {
        let (connector, listener) = MemoryConnector::new();
        spawn_download_remote(listener, DownloadRemote::new(key(), vec![1; 3000], 1000));
        let (seq, _rx) = sequencer(&connector, DownloadSpec::new(link(&key()), 2));

        assert!(matches!(
            seq.run().await,
            Err(TransferError::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn huge_declared_total_is_not_preallocated() {
        let (connector, listener) = MemoryConnector::new();
        let remote = spawn_download_remote(listener, DownloadRemote::new(key(), vec![1; 10], 1024));
        let (seq, _rx) = sequencer(&connector, DownloadSpec::new(link(&key()), u32::MAX));

        let err = seq.run().await.unwrap_err();
        assert!(matches!(&err, TransferError::ProtocolViolation(m) if m.contains("remote reports 1 chunks")));
        remote.wait_disconnects(1).await;
        assert_eq!(remote.frames(), vec![r#"{"part":0}"#]);
    }

    #[tokio::test]
    async fn swapped_chunk_is_violation() {
        let (connector, listener) = MemoryConnector::new();
        let mut script = DownloadRemote::new(key(), (0..30).collect(), 10);
        script.swap = Some((1, 2));
        let remote = spawn_download_remote(listener, script);
        let (seq, mut rx) = sequencer(&connector, DownloadSpec::new(link(&key()), 3));

        let err = seq.run().await.unwrap_err();
        assert!(
            matches!(&err, TransferError::ProtocolViolation(m) if m == "chunk 1 was sealed as chunk 2"),
            "{err}"
        );
        remote.wait_disconnects(1).await;
        assert_eq!(remote.frames().len(), 2);
        assert_eq!(remote.ended(), 0);

        let events = collect_events(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, TransferEvent::DownloadFinalized { .. })));
    }

    #[tokio::test]
    async fn chunk_from_another_file_is_violation() {
        let (connector, listener) = MemoryConnector::new();
        let mut script = DownloadRemote::new(key(), vec![7; 30], 10);
        script.foreign_nonce = Some(1);
        let remote = spawn_download_remote(listener, script);
        let (seq, _rx) = sequencer(&connector, DownloadSpec::new(link(&key()), 3));

        let err = seq.run().await.unwrap_err();
        assert!(
            matches!(&err, TransferError::ProtocolViolation(m) if m == "chunk 1 was sealed for another file"),
            "{err}"
        );
        remote.wait_disconnects(1).await;
        assert_eq!(remote.frames().len(), 2);
    }

    #[tokio::test]
    async fn cancel_stops_before_next_request() {
        let (connector, listener) = MemoryConnector::new();
        let cancel = CancellationToken::new();
        let mut script = DownloadRemote::new(key(), vec![2; 50], 10);
        script.cancel_after = Some((2, cancel.clone()));
        let remote = spawn_download_remote(listener, script);
        let (seq, mut rx) =
            cancellable_sequencer(&connector, DownloadSpec::new(link(&key()), 5), cancel.clone());

        let err = seq.run().await.unwrap_err();
        assert!(err.is_cancelled());

        remote.wait_disconnects(1).await;
        assert_eq!(remote.frames(), vec![r#"{"part":0}"#, r#"{"part":1}"#]);
        assert_eq!(remote.ended(), 0);

        let events = collect_events(&mut rx);
        assert!(events.contains(&TransferEvent::StateChanged {
            transfer: 1,
            state: TransferState::Cancelled,
        }));
        assert!(!events.iter().any(|e| matches!(
            e,
            TransferEvent::Failed { .. }
                | TransferEvent::DownloadFinalized { .. }
                | TransferEvent::StateChanged {
                    state: TransferState::Complete | TransferState::Failed,
                    ..
                }
        )));

        // A second cancel changes nothing.
        cancel.cancel();
        tokio::task::yield_now().await;
        assert!(collect_events(&mut rx).is_empty());
        assert_eq!(remote.frames().len(), 2);
    }

    #[tokio::test]
    async fn missing_metadata_falls_back() {
        let (connector, listener) = MemoryConnector::new();
        let mut script = DownloadRemote::new(key(), vec![1; 4], 1024);
        script.name = None;
        script.content_type = Some(String::new());
        spawn_download_remote(listener, script);
        let (seq, _rx) = sequencer(&connector, DownloadSpec::new(link(&key()), 1));

        let file = seq.run().await.unwrap();
        assert_eq!(file.name, "download");
        assert_eq!(file.content_type, "application/octet-stream");
    }

    #[test]
    fn password_required_refuses_to_start() {
        let (connector, _listener) = MemoryConnector::new();
        let (events, _rx) = EventSink::channel();
        let spec = DownloadSpec::new("http://files.test/r/x#AAAA", 1)
            .with_password(Some(String::new()))
            .password_required(true);
        let result = DownloadSequencer::new(
            1,
            spec,
            &config(),
            Arc::new(connector),
            events,
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(TransferError::PasswordRequired)));
    }

    #[test]
    fn link_without_key_is_rejected() {
        let (connector, _listener) = MemoryConnector::new();
        let (events, _rx) = EventSink::channel();
        let result = DownloadSequencer::new(
            1,
            DownloadSpec::new("http://files.test/r/x", 1),
            &config(),
            Arc::new(connector),
            events,
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(TransferError::Key(_))));
    }
}
