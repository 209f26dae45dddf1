//! Shader hot-reload support
//!
//! Watches the WGSL source directory and reports changed files after a
//! short debounce, so editors that write in several bursts trigger a
//! single rebuild. Only useful when running from the source tree; the
//! shipped binary falls back to its embedded shaders.

use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver};
use std::time::{Duration, Instant};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

const DEBOUNCE: Duration = Duration::from_millis(100);

/// Directory holding the WGSL sources in the source tree
pub fn shaders_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("src")
        .join("render")
        .join("shaders")
}

pub fn glow_shader_path() -> PathBuf {
    shaders_dir().join("glow.wgsl")
}

pub struct ShaderWatcher {
    _watcher: RecommendedWatcher,
    receiver: Receiver<Result<Event, notify::Error>>,
    last_change: Option<Instant>,
    pending_path: Option<PathBuf>,
}

impl ShaderWatcher {
    pub fn new() -> Result<Self, notify::Error> {
        let (tx, rx) = channel();
        let mut watcher = RecommendedWatcher::new(
            move |result| {
                let _ = tx.send(result);
            },
            Config::default(),
        )?;

        let dir = shaders_dir();
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!("🔄 Shader hot-reload enabled, watching: {}", dir.display());

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
            last_change: None,
            pending_path: None,
        })
    }

    /// Drain watcher events and return a changed shader path once it has
    /// been quiet for the debounce window
    pub fn poll(&mut self) -> Option<PathBuf> {
        while let Ok(result) = self.receiver.try_recv() {
            let Ok(event) = result else { continue };
            if !event.kind.is_modify() && !event.kind.is_create() {
                continue;
            }
            for path in event.paths {
                if path.extension().is_some_and(|ext| ext == "wgsl") {
                    self.last_change = Some(Instant::now());
                    self.pending_path = Some(path);
                }
            }
        }

        if self.last_change?.elapsed() < DEBOUNCE {
            return None;
        }
        self.last_change = None;

        let path = self.pending_path.take()?;
        tracing::info!("🔄 Shader changed: {}", path.display());
        Some(path)
    }
}
