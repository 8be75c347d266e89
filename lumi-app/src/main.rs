//! Lumi host entry point.
//!
//! Bridges the audio engine to a realtime session collaborator over stdio:
//! microphone blobs go out on stdout as JSON lines, session messages
//! (model audio, interruptions, mute) come in on stdin. Logs go to stderr.

mod session;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use lumi_core::{audio::device::list_devices, LumiEngine, LumiError, WireAudioBlob};
use session::{parse_line, SessionMessage};
use settings::{default_settings_path, load_settings, save_settings};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Blobs buffered between the pipeline thread and the stdout writer.
const OUTBOUND_QUEUE: usize = 32;

#[derive(Debug)]
struct Args {
    settings_path: Option<PathBuf>,
    list_devices: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut settings_path = None;
    let mut list_devices = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--settings" => {
                let v = it.next().context("missing value for --settings")?;
                settings_path = Some(PathBuf::from(v));
            }
            "--list-devices" => list_devices = true,
            "--help" | "-h" => {
                println!("Usage: lumi [--settings <file.json>] [--list-devices]");
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(Args {
        settings_path,
        list_devices,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lumi=info,lumi_core=info")),
        )
        .init();

    let args = parse_args()?;

    if args.list_devices {
        let devices = list_devices();
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    let settings_path = args.settings_path.unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path);
    if !settings_path.exists() {
        if let Err(e) = save_settings(&settings_path, &settings) {
            warn!(path = %settings_path.display(), "could not write default settings: {e}");
        }
    }
    info!(path = %settings_path.display(), "Lumi starting");

    let engine = Arc::new(LumiEngine::new(settings.engine_config()));

    if settings.playback_enabled {
        let preferred = settings.preferred_output_device.clone();
        match tokio::task::block_in_place(|| engine.start_playback(preferred)) {
            Ok(rate) => info!(sample_rate = rate, "speaker ready"),
            Err(e) => warn!("playback unavailable, model audio will be ignored: {e}"),
        }
    }

    let (outbound_tx, outbound_rx) = mpsc::channel::<WireAudioBlob>(OUTBOUND_QUEUE);
    let preferred = settings.preferred_input_device.clone();
    tokio::task::block_in_place(|| engine.start_capture_with_device(outbound_tx, preferred))
        .context("failed to start microphone capture")?;

    let status_task = {
        let mut status_rx = engine.subscribe_status();
        tokio::spawn(async move {
            while let Ok(ev) = status_rx.recv().await {
                info!(status = ?ev.status, detail = ev.detail.as_deref(), "engine status");
            }
        })
    };

    let mut writer = tokio::spawn(write_outbound(outbound_rx));
    let mut reader = tokio::spawn(read_session(Arc::clone(&engine)));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        res = &mut reader => match res {
            Ok(Ok(())) => info!("session input closed"),
            Ok(Err(e)) => warn!("session input failed: {e:#}"),
            Err(e) => warn!("session reader task failed: {e}"),
        },
        res = &mut writer => match res {
            Ok(Ok(())) => info!("outbound stream ended"),
            Ok(Err(e)) => warn!("session output failed: {e:#}"),
            Err(e) => warn!("session writer task failed: {e}"),
        },
    }

    match engine.stop_capture() {
        Ok(()) | Err(LumiError::NotRunning) => {}
        Err(e) => warn!("stop capture failed: {e}"),
    }
    match engine.stop_playback() {
        Ok(()) | Err(LumiError::NotRunning) => {}
        Err(e) => warn!("stop playback failed: {e}"),
    }
    reader.abort();
    status_task.abort();

    let diagnostics = engine.diagnostics_snapshot();
    info!(
        diagnostics = %serde_json::to_string(&diagnostics)?,
        "Lumi stopped"
    );
    Ok(())
}

/// Forward microphone blobs to stdout, one JSON object per line.
async fn write_outbound(mut rx: mpsc::Receiver<WireAudioBlob>) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(blob) = rx.recv().await {
        let mut line = serde_json::to_vec(&blob)?;
        line.push(b'\n');
        stdout
            .write_all(&line)
            .await
            .context("writing outbound blob")?;
        stdout.flush().await?;
    }
    Ok(())
}

/// Apply session messages from stdin until EOF.
async fn read_session(engine: Arc<LumiEngine>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading session input")? {
        let message = match parse_line(&line) {
            None => continue,
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                warn!("ignoring unparsable session message: {e}");
                continue;
            }
        };

        match message {
            SessionMessage::Audio(blob) => match engine.play_inbound(&blob) {
                Ok(scheduled) => debug!(
                    start_ms = scheduled.start.as_millis() as u64,
                    duration_ms = scheduled.duration.as_millis() as u64,
                    queued_ms = engine.queued_playback().as_millis() as u64,
                    "model audio queued"
                ),
                Err(LumiError::NotRunning) => debug!("playback disabled, model audio ignored"),
                // Malformed payloads are already counted and logged by the engine.
                Err(LumiError::MalformedPayload { .. } | LumiError::Base64(_)) => {}
                Err(e) => warn!("model audio rejected: {e}"),
            },
            SessionMessage::Interrupted => {
                engine.interrupt_playback();
                info!("peer interrupted, playback cleared");
            }
            SessionMessage::TurnComplete => engine.finish_playback_turn(),
            SessionMessage::Mute { muted } => engine.set_muted(muted),
        }
    }
    Ok(())
}
