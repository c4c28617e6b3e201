//! Scripted in-process remotes for sequencer tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use nofile_connection::MemoryListener;
use nofile_protocol::{
    ChunkPayload, DownloadChunkMeta, UploadAck, UploadChunkMeta, decode_frame, encode_frame,
};
use nofile_transfer::{ChunkPlan, TransferKey, encrypt_chunk};

use crate::events::TransferEvent;

/// What a remote saw.
#[derive(Clone, Default)]
pub(crate) struct RemoteLog {
    frames: Arc<Mutex<Vec<String>>>,
    pipelined: Arc<AtomicBool>,
    ended: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
}

impl RemoteLog {
    pub(crate) fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    /// `true` if no request ever arrived while another was unanswered.
    pub(crate) fn never_pipelined(&self) -> bool {
        !self.pipelined.load(Ordering::SeqCst)
    }

    pub(crate) fn ended(&self) -> usize {
        self.ended.load(Ordering::SeqCst)
    }

    /// Waits until `n` connections have been closed by the client.
    pub(crate) async fn wait_disconnects(&self, n: usize) {
        let poll = async {
            while self.disconnects.load(Ordering::SeqCst) < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), poll)
            .await
            .expect("remote never saw the channel close");
    }

    fn push(&self, frame: String) -> usize {
        let mut frames = self.frames.lock().unwrap();
        frames.push(frame);
        frames.len()
    }
}

#[derive(Default)]
pub(crate) struct UploadRemote {
    /// Reject chunks with this message.
    pub reject_with: Option<String>,
    /// Limit rejections to this transfer id.
    pub reject_only: Option<u64>,
    /// Never answer this transfer.
    pub stall: Option<u64>,
    /// Cancel the token after acking this many chunks.
    pub cancel_after: Option<(usize, CancellationToken)>,
    /// Close the first connection instead of answering the n-th frame.
    pub drop_frame: Option<usize>,
}

pub(crate) fn spawn_upload_remote(mut listener: MemoryListener, script: UploadRemote) -> RemoteLog {
    let log = RemoteLog::default();
    let record = log.clone();
    tokio::spawn(async move {
        let mut dropped = false;
        while let Some((_, mut peer)) = listener.accept().await {
            while let Some(frame) = peer.recv().await {
                let seen = record.push(frame.clone());
                if peer.try_recv().is_some() {
                    record.pipelined.store(true, Ordering::SeqCst);
                }
                let Ok((meta, _)) = decode_frame::<UploadChunkMeta>(&frame) else {
                    continue;
                };

                if !dropped && script.drop_frame == Some(seen) {
                    dropped = true;
                    peer.close(Some("going away")).await;
                    break;
                }

                if script.stall == Some(meta.i) {
                    continue;
                }
                let ack = match &script.reject_with {
                    Some(msg) if script.reject_only.is_none_or(|i| i == meta.i) => {
                        UploadAck::rejected(meta.i, msg.clone())
                    }
                    _ => UploadAck {
                        short: Some("aZ9".into()),
                        token: Some("t0k".into()),
                        created_at: Some(1_700_000_000),
                        delay: Some(meta.delay),
                        ..UploadAck::accepted(meta.i, meta.part, meta.total)
                    },
                };
                peer.reply(encode_frame(&ack, None).unwrap()).await;

                if let Some((after, cancel)) = &script.cancel_after
                    && seen == *after
                {
                    cancel.cancel();
                }
            }
            record.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    });
    log
}

pub(crate) struct DownloadRemote {
    pub key: TransferKey,
    pub file: Vec<u8>,
    pub chunk_size: usize,
    pub name: Option<String>,
    pub content_type: Option<String>,
    /// Answer every request with `{"msg": ...}`.
    pub reject_with: Option<String>,
    /// Flip a ciphertext bit in this chunk.
    pub tamper: Option<u32>,
    /// Answer the first part with the chunk sealed for the second.
    pub swap: Option<(u32, u32)>,
    /// Seal this chunk under a different base nonce.
    pub foreign_nonce: Option<u32>,
    /// Cancel the token after serving this many chunks.
    pub cancel_after: Option<(usize, CancellationToken)>,
}

impl DownloadRemote {
    pub(crate) fn new(key: TransferKey, file: Vec<u8>, chunk_size: usize) -> Self {
        Self {
            key,
            file,
            chunk_size,
            name: Some("notes.txt".into()),
            content_type: Some("text/plain".into()),
            reject_with: None,
            tamper: None,
            swap: None,
            foreign_nonce: None,
            cancel_after: None,
        }
    }

    fn respond(&self, part: u32) -> String {
        if let Some(msg) = &self.reject_with {
            return serde_json::json!({ "msg": msg }).to_string();
        }
        let plan = ChunkPlan::new(self.file.len() as u64, self.chunk_size).unwrap();
        let sealed_as = match self.swap {
            Some((asked, served)) if asked == part => served,
            _ => part,
        };
        let range = plan.range(sealed_as).unwrap();
        let slice = &self.file[range.start as usize..range.end as usize];
        let key = if self.foreign_nonce == Some(part) {
            TransferKey::from_parts(*self.key.secret().as_bytes(), [0xee; 12])
        } else {
            self.key.clone()
        };
        let mut sealed = encrypt_chunk(&key, sealed_as, slice).unwrap();
        if self.tamper == Some(part) {
            sealed.ciphertext[0] ^= 0x01;
        }
        let meta = DownloadChunkMeta {
            part: Some(part),
            total: Some(plan.total()),
            name: self.name.clone(),
            content_type: self.content_type.clone(),
            size: Some(self.file.len() as u64),
            msg: None,
        };
        let payload = ChunkPayload::new(&sealed.nonce, sealed.ciphertext);
        encode_frame(&meta, Some(&payload)).unwrap()
    }
}

pub(crate) fn spawn_download_remote(mut listener: MemoryListener, script: DownloadRemote) -> RemoteLog {
    let log = RemoteLog::default();
    let record = log.clone();
    tokio::spawn(async move {
        let mut served = 0;
        while let Some((_, mut peer)) = listener.accept().await {
            while let Some(frame) = peer.recv().await {
                record.push(frame.clone());
                let request: serde_json::Value = match serde_json::from_str(&frame) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                if request["ended"] == true {
                    record.ended.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
                let Some(part) = request["part"].as_u64() else {
                    continue;
                };
                peer.reply(script.respond(part as u32)).await;
                served += 1;

                if let Some((after, cancel)) = &script.cancel_after
                    && served == *after
                {
                    cancel.cancel();
                }
            }
            record.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    });
    log
}

/// Drains whatever events are queued.
pub(crate) fn collect_events(rx: &mut mpsc::Receiver<TransferEvent>) -> Vec<TransferEvent> {
    let mut events = Vec::new();
    while let Ok(e) = rx.try_recv() {
        events.push(e);
    }
    events
}
