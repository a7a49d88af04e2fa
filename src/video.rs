use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;
use serde_json::{json, Value};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::device::{DeviceError, DeviceFactory, MediaDevice, Position, StillImage};
use crate::feed::FeedItem;

#[cfg(unix)]
type IpcStream = UnixStream;
#[cfg(not(unix))]
type IpcStream = std::fs::File;

const CONNECT_RETRIES: usize = 40;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(50);

const OBSERVED_PROPERTIES: [&str; 4] = ["time-pos", "duration", "pause", "mute"];

#[derive(Debug, Clone)]
pub struct MpvOptions {
    pub mpv_path: String,
    pub extra_args: Vec<String>,
}

pub struct MpvFactory {
    options: MpvOptions,
}

impl MpvFactory {
    pub fn new(options: MpvOptions) -> Self {
        Self { options }
    }
}

impl DeviceFactory for MpvFactory {
    fn create(&self, item: &FeedItem) -> Result<Box<dyn MediaDevice>> {
        if !item.is_video() {
            return Ok(Box::new(StillImage));
        }
        let device = MpvVideo::spawn(&self.options, item)
            .with_context(|| format!("start mpv for item {}", item.id))?;
        Ok(Box::new(device))
    }
}

#[derive(Debug)]
struct Shared {
    paused: bool,
    muted: bool,
    time_pos: f64,
    duration: Option<f64>,
    running: bool,
    progress_tx: Option<Sender<Position>>,
}

impl Shared {
    fn position(&self) -> Position {
        Position {
            current_time: self.time_pos,
            duration: self.duration,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpcMessage {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

/// An mpv process per feed card, driven over its JSON IPC socket.
pub struct MpvVideo {
    child: Child,
    stream: IpcStream,
    shared: Arc<Mutex<Shared>>,
    reader: Option<thread::JoinHandle<()>>,
    ipc_path: String,
}

impl MpvVideo {
    pub fn spawn(options: &MpvOptions, item: &FeedItem) -> Result<Self> {
        if item.media_url.trim().is_empty() {
            return Err(anyhow!("video URL missing"));
        }
        let ipc_path = unique_ipc_path();
        if let Err(err) = fs::remove_file(&ipc_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %ipc_path, error = %err, "failed to remove stale mpv socket");
            }
        }

        let mut args = vec![
            item.media_url.clone(),
            "--pause".to_string(),
            "--mute=yes".to_string(),
            "--loop-file=inf".to_string(),
            "--keep-open=no".to_string(),
            "--idle=no".to_string(),
            "--really-quiet".to_string(),
            "--terminal=no".to_string(),
            "--input-terminal=no".to_string(),
            "--no-config".to_string(),
            format!("--input-ipc-server={ipc_path}"),
        ];
        if !item.author.is_empty() {
            args.push(format!("--force-media-title=@{}", item.author));
        }
        args.extend(options.extra_args.iter().cloned());
        tracing::debug!(item = item.id, ?args, "spawning mpv");

        let mut child = Command::new(&options.mpv_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("launch {} to play {}", options.mpv_path, item.media_url))?;

        let stream = match connect_ipc(&ipc_path, &mut child) {
            Ok(stream) => stream,
            Err(err) => {
                abandon_child(&mut child, &ipc_path);
                return Err(err);
            }
        };

        let shared = Arc::new(Mutex::new(Shared {
            paused: true,
            muted: true,
            time_pos: 0.0,
            duration: None,
            running: true,
            progress_tx: None,
        }));

        let read_half = match stream.try_clone().context("clone mpv IPC stream") {
            Ok(read_half) => read_half,
            Err(err) => {
                abandon_child(&mut child, &ipc_path);
                return Err(err);
            }
        };
        let reader_shared = shared.clone();
        let item_id = item.id;
        let reader = thread::spawn(move || read_events(read_half, reader_shared, item_id));

        let mut device = Self {
            child,
            stream,
            shared,
            reader: Some(reader),
            ipc_path,
        };
        for (index, property) in OBSERVED_PROPERTIES.iter().enumerate() {
            device
                .send(json!(["observe_property", index + 1, property]))
                .with_context(|| format!("observe mpv property {property}"))?;
        }
        Ok(device)
    }

    fn send(&mut self, command: Value) -> Result<(), DeviceError> {
        if !self.shared.lock().running {
            return Err(DeviceError::Closed);
        }
        let payload = json!({ "command": command });
        let mut serialized =
            serde_json::to_string(&payload).map_err(|err| DeviceError::Ipc(err.to_string()))?;
        serialized.push('\n');
        self.stream
            .write_all(serialized.as_bytes())
            .map_err(|err| DeviceError::Ipc(err.to_string()))
    }

    fn set_pause(&mut self, paused: bool) -> Result<(), DeviceError> {
        self.send(json!(["set_property", "pause", paused]))?;
        self.shared.lock().paused = paused;
        Ok(())
    }
}

impl MediaDevice for MpvVideo {
    fn is_video(&self) -> bool {
        true
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        self.set_pause(false)
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        self.set_pause(true)
    }

    fn paused(&self) -> bool {
        self.shared.lock().paused
    }

    fn muted(&self) -> bool {
        self.shared.lock().muted
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), DeviceError> {
        self.send(json!(["set_property", "mute", muted]))?;
        self.shared.lock().muted = muted;
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.shared.lock().time_pos
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<(), DeviceError> {
        self.send(json!(["seek", seconds, "absolute"]))?;
        self.shared.lock().time_pos = seconds;
        Ok(())
    }

    fn duration(&self) -> Option<f64> {
        self.shared.lock().duration
    }

    fn subscribe_progress(&mut self) -> Receiver<Position> {
        let (tx, rx) = unbounded();
        self.shared.lock().progress_tx = Some(tx);
        rx
    }

    fn unsubscribe_progress(&mut self) {
        self.shared.lock().progress_tx = None;
    }
}

impl Drop for MpvVideo {
    fn drop(&mut self) {
        let _ = self.send(json!(["quit"]));
        self.shared.lock().running = false;
        let _ = self.child.kill();
        let _ = self.child.wait();
        close_stream(&self.stream);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        cleanup_ipc_path(&self.ipc_path);
    }
}

fn read_events(stream: IpcStream, shared: Arc<Mutex<Shared>>, item_id: u32) {
    let reader = BufReader::new(stream);
    for line in reader.lines().map_while(Result::ok) {
        let message: IpcMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(item = item_id, error = %err, "unparsed mpv message");
                continue;
            }
        };
        apply_message(&shared, &message, item_id);
    }
    shared.lock().running = false;
    tracing::debug!(item = item_id, "mpv IPC stream closed");
}

fn apply_message(shared: &Mutex<Shared>, message: &IpcMessage, item_id: u32) {
    if let Some(error) = message.error.as_deref() {
        if error != "success" {
            tracing::warn!(item = item_id, error, "mpv rejected command");
        }
        return;
    }
    let mut state = shared.lock();
    match message.event.as_deref() {
        Some("property-change") => match message.name.as_deref() {
            Some("time-pos") => {
                if let Some(pos) = message.data.as_f64() {
                    state.time_pos = pos;
                    let position = state.position();
                    if let Some(tx) = &state.progress_tx {
                        if tx.send(position).is_err() {
                            state.progress_tx = None;
                        }
                    }
                }
            }
            Some("duration") => {
                state.duration = message.data.as_f64().filter(|d| *d > 0.0);
            }
            Some("pause") => {
                if let Some(paused) = message.data.as_bool() {
                    state.paused = paused;
                }
            }
            Some("mute") => {
                if let Some(muted) = message.data.as_bool() {
                    state.muted = muted;
                }
            }
            _ => {}
        },
        Some("shutdown") => state.running = false,
        _ => {}
    }
}

#[cfg(unix)]
fn connect_ipc(path: &str, child: &mut Child) -> Result<IpcStream> {
    for _ in 0..CONNECT_RETRIES {
        match UnixStream::connect(path) {
            Ok(stream) => return Ok(stream),
            Err(_) => {
                if let Some(status) = child.try_wait().context("poll mpv status")? {
                    return Err(anyhow!("mpv exited early with status {:?}", status.code()));
                }
                thread::sleep(CONNECT_RETRY_DELAY);
            }
        }
    }
    Err(anyhow!("connect to mpv IPC socket {}", path))
}

#[cfg(not(unix))]
fn connect_ipc(_path: &str, _child: &mut Child) -> Result<IpcStream> {
    Err(anyhow!("mpv playback controls are not supported on this platform."))
}

#[cfg(unix)]
fn close_stream(stream: &IpcStream) {
    let _ = stream.shutdown(std::net::Shutdown::Both);
}

#[cfg(not(unix))]
fn close_stream(_stream: &IpcStream) {}

fn unique_ipc_path() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    let mut path = std::env::temp_dir();
    path.push(format!("reels-mpv-{}-{suffix}.sock", std::process::id()));
    path.to_string_lossy().to_string()
}

/// Stops an mpv process that never made it into an `MpvVideo`.
fn abandon_child(child: &mut Child, ipc_path: &str) {
    let _ = child.kill();
    let _ = child.wait();
    cleanup_ipc_path(ipc_path);
}

fn cleanup_ipc_path(path: &str) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path, error = %err, "failed to remove mpv socket");
        }
    }
}
