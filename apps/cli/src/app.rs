//! Runs one command against the transfer manager.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use nofile_client::{
    DownloadSpec, DownloadedFile, TransferError, TransferEvent, TransferManager, UploadJob,
};
use nofile_connection::WsConnector;
use nofile_protocol::Severity;

use crate::Command;
use crate::config::Config;

pub async fn run(config: Config, command: Command) -> anyhow::Result<()> {
    let client = config.client_config();
    let connector = Arc::new(WsConnector::new(client.transport.max_frame_size));
    let mut manager = TransferManager::new(client, connector);

    if let Some(events) = manager.take_events() {
        tokio::spawn(report(events));
    }

    let controller = manager.controller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling transfers");
            controller.cancel_all();
        }
    });

    match command {
        Command::Upload {
            files,
            delay,
            burn,
            password,
            json,
        } => {
            let delay = delay.unwrap_or(config.default_delay);
            upload(&mut manager, &files, delay, burn, password, json).await
        }
        Command::Download {
            link,
            total,
            password,
            password_required,
            output,
        } => {
            let spec = DownloadSpec::new(link, total)
                .with_password(password)
                .password_required(password_required);
            download(&mut manager, spec, output).await
        }
    }
}

async fn upload(
    manager: &mut TransferManager,
    files: &[PathBuf],
    delay: u32,
    burn: bool,
    password: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let mut jobs = Vec::with_capacity(files.len());
    for path in files {
        let job = UploadJob::from_path(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?
            .with_delay(delay)
            .with_burn(burn)
            .with_password(password.clone());
        jobs.push(job);
    }
    manager.enqueue(jobs);

    let outcomes = manager.run_queue().await;
    let mut failed = 0;
    let mut cancelled = 0;
    let mut finished = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(upload) => finished.push(upload),
            Err(e) if e.is_cancelled() => cancelled += 1,
            Err(_) => failed += 1,
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&finished)?);
    } else {
        for upload in &finished {
            println!("{}", upload.name);
            println!("  link:   {}", upload.links.download_with_key);
            println!("  no key: {}", upload.links.download);
            println!("  delete: {}", upload.links.delete);
        }
    }

    if cancelled > 0 {
        bail!("{cancelled} upload(s) cancelled");
    }
    if failed > 0 {
        bail!("{failed} of {} upload(s) failed", files.len());
    }
    Ok(())
}

async fn download(
    manager: &mut TransferManager,
    spec: DownloadSpec,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let file = match manager.download(spec).await {
        Ok(file) => file,
        Err(TransferError::Cancelled) => bail!("download cancelled"),
        Err(e) => return Err(e.into()),
    };

    let path = output_path(output, &file);
    tokio::fs::write(&path, &file.bytes)
        .await
        .with_context(|| format!("cannot write {}", path.display()))?;
    info!(path = %path.display(), size = file.bytes.len(), content_type = %file.content_type, "file saved");
    println!("{}", path.display());
    Ok(())
}

/// An explicit directory receives the file under its declared name.
fn output_path(output: Option<PathBuf>, file: &DownloadedFile) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(&file.name),
        Some(path) => path,
        None => Path::new(".").join(&file.name),
    }
}

/// Logs transfer events until the manager goes away.
async fn report(mut events: mpsc::Receiver<TransferEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            TransferEvent::Queued { count } => info!(count, "queued"),
            TransferEvent::Progress {
                transfer,
                completed,
                total,
            } => info!(transfer, "{completed}/{total} chunks"),
            TransferEvent::Retrying {
                transfer,
                candidate,
                attempt,
                delay,
                reason,
            } => warn!(
                transfer,
                candidate,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "{reason}, retrying"
            ),
            TransferEvent::Failed { transfer, notice } => match notice.severity {
                Severity::Warning => warn!(transfer, "{}", notice.message),
                _ => error!(transfer, "{}", notice.message),
            },
            TransferEvent::UploadFinalized { transfer, upload } => {
                info!(transfer, short = %upload.short, "uploaded {}", upload.name)
            }
            TransferEvent::DownloadFinalized { transfer, name, .. } => {
                info!(transfer, "downloaded {name}")
            }
            TransferEvent::StateChanged { .. } | TransferEvent::GuardChanged { .. } => {}
        }
    }
}
