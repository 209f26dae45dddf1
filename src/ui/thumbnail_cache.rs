//! Thumbnail cache for experience cover images
//!
//! Loads and caches cover thumbnails on a background thread so the menu
//! never blocks on disk I/O.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use egui::{ColorImage, Context, TextureHandle, TextureOptions};

/// Thumbnail bounds (longest edge) - sized for 2x displays
const THUMBNAIL_SIZE: u32 = 160;

/// Maximum number of thumbnails to cache
const MAX_CACHE_SIZE: usize = 64;

/// Request for a cover load
struct ThumbnailRequest {
    key: String,
    path: PathBuf,
}

/// Result of a cover load
struct ThumbnailResult {
    key: String,
    /// None when the image could not be loaded
    image: Option<(Vec<u8>, u32, u32)>,
}

/// Cache for cover thumbnails with background loading
pub struct ThumbnailCache {
    /// Cached thumbnail textures (key -> TextureHandle)
    cache: HashMap<String, TextureHandle>,
    /// Keys currently being loaded (to avoid duplicate requests)
    pending: HashSet<String>,
    /// Keys that failed to load (don't retry)
    failed: HashSet<String>,
    request_tx: Sender<ThumbnailRequest>,
    result_rx: Receiver<ThumbnailResult>,
}

impl ThumbnailCache {
    /// Create a new cache with a background loader thread
    pub fn new() -> Self {
        let (request_tx, request_rx) = mpsc::channel::<ThumbnailRequest>();
        let (result_tx, result_rx) = mpsc::channel::<ThumbnailResult>();

        thread::Builder::new()
            .name("thumbnail-loader".into())
            .spawn(move || {
                Self::loader_thread(request_rx, result_tx);
            })
            .expect("Failed to spawn thumbnail loader thread");

        Self {
            cache: HashMap::new(),
            pending: HashSet::new(),
            failed: HashSet::new(),
            request_tx,
            result_rx,
        }
    }

    fn loader_thread(request_rx: Receiver<ThumbnailRequest>, result_tx: Sender<ThumbnailResult>) {
        while let Ok(request) = request_rx.recv() {
            let image = load_thumbnail(&request.path);
            if image.is_none() {
                tracing::debug!("Failed to load thumbnail: {}", request.path.display());
            }
            let result = ThumbnailResult {
                key: request.key,
                image,
            };
            if result_tx.send(result).is_err() {
                // Main thread dropped, exit
                break;
            }
        }
    }

    /// Poll for completed loads and insert them into the cache
    ///
    /// Call this each frame from the main thread.
    pub fn poll(&mut self, ctx: &Context) {
        while let Ok(result) = self.result_rx.try_recv() {
            // Discard results for keys that are no longer pending
            if !self.pending.remove(&result.key) {
                continue;
            }

            let Some((pixels, width, height)) = result.image else {
                self.failed.insert(result.key);
                continue;
            };

            let image =
                ColorImage::from_rgba_unmultiplied([width as usize, height as usize], &pixels);
            let texture = ctx.load_texture(
                format!("thumb_{}", result.key),
                image,
                TextureOptions::LINEAR,
            );

            if self.cache.len() >= MAX_CACHE_SIZE {
                // Simple eviction: drop an arbitrary entry
                if let Some(key) = self.cache.keys().next().cloned() {
                    self.cache.remove(&key);
                }
            }

            self.cache.insert(result.key, texture);
        }
    }

    /// Get a cached thumbnail if available
    pub fn get(&self, key: &str) -> Option<&TextureHandle> {
        self.cache.get(key)
    }

    /// Request a cover load
    ///
    /// Returns true if a new request was made, false if already
    /// cached, pending or failed.
    pub fn request(&mut self, key: String, path: PathBuf) -> bool {
        if self.cache.contains_key(&key) || self.pending.contains(&key) || self.failed.contains(&key)
        {
            return false;
        }

        let request = ThumbnailRequest {
            key: key.clone(),
            path,
        };

        if self.request_tx.send(request).is_ok() {
            self.pending.insert(key);
            true
        } else {
            false
        }
    }

    /// Check if a thumbnail is still loading
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains(key)
    }

    /// Clear the entire cache (including pending requests)
    pub fn clear(&mut self) {
        self.cache.clear();
        self.failed.clear();
        self.pending.clear();
        // In-flight loads may still complete but will be discarded
        // since their keys are no longer in pending
    }
}

impl Default for ThumbnailCache {
    fn default() -> Self {
        Self::new()
    }
}

fn load_thumbnail(path: &Path) -> Option<(Vec<u8>, u32, u32)> {
    let image = image::open(path).ok()?;
    let thumb = image.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE).to_rgba8();
    let (width, height) = thumb.dimensions();
    Some((thumb.into_raw(), width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_request_and_poll_loads_texture() {
        let dir = std::env::temp_dir().join("ar-stage-thumb-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cover.png");
        image::RgbaImage::from_pixel(8, 8, image::Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();

        let ctx = Context::default();
        let mut cache = ThumbnailCache::new();
        assert!(cache.request("alpha".into(), path.clone()));
        // Duplicate request while pending is refused
        assert!(!cache.request("alpha".into(), path));

        for _ in 0..500 {
            cache.poll(&ctx);
            if cache.get("alpha").is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }

        assert!(cache.get("alpha").is_some());
        assert!(!cache.is_pending("alpha"));
    }

    #[test]
    fn test_missing_file_marked_failed() {
        let ctx = Context::default();
        let mut cache = ThumbnailCache::new();
        let path = PathBuf::from("/nonexistent/cover.png");
        assert!(cache.request("ghost".into(), path.clone()));

        for _ in 0..500 {
            cache.poll(&ctx);
            if !cache.is_pending("ghost") {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }

        assert!(cache.get("ghost").is_none());
        // Failed keys are not retried
        assert!(!cache.request("ghost".into(), path));
    }
}
