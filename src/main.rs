//! AR Stage - Main Entry Point
//!
//! A desktop AR player: tracks image targets, anchors per-target media
//! (video, image, glTF model) to them, and composites the scene through a
//! glow pass with an egui experience menu on top.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ar_stage::config::ExperienceConfig;
use ar_stage::preferences::AppPreferences;
use ar_stage::session::{SessionManager, TrackerFactory};
use ar_stage::tracking::{ScriptedSource, TargetId, TrackingSource};
use ar_stage::ui::MenuAction;
use ar_stage::App;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

const WINDOW_TITLE: &str = "AR Stage";
const TARGET_FPS: u64 = 60;

/// How many target slots the built-in tracking script covers
const DEMO_TARGET_SLOTS: u32 = 8;

/// Built-in tracking backend: a scripted found / pose / lost loop
///
/// The script covers more target slots than most experiences bind; events
/// for indices the binder never registers are dropped at poll time.
fn demo_tracker_factory() -> TrackerFactory {
    Box::new(|path: &Path| {
        let targets: Vec<TargetId> = (0..DEMO_TARGET_SLOTS).map(TargetId).collect();
        Box::new(ScriptedSource::demo_loop(path, &targets)) as Box<dyn TrackingSource>
    })
}

/// Result from an async file dialog
struct FileDialogResult {
    path: Option<PathBuf>,
}

/// Manages async file dialogs that run on background threads
struct AsyncFileDialogs {
    /// Receiver for completed dialogs
    receiver: Receiver<FileDialogResult>,
    /// Sender to pass to spawned threads
    sender: Sender<FileDialogResult>,
    /// Whether a dialog is currently open
    dialog_open: bool,
}

impl AsyncFileDialogs {
    fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            receiver,
            sender,
            dialog_open: false,
        }
    }

    /// Spawn an open-config dialog on a background thread
    fn spawn_open_config(&mut self) {
        if self.dialog_open {
            return;
        }
        self.dialog_open = true;
        let sender = self.sender.clone();
        std::thread::spawn(move || {
            let path = rfd::FileDialog::new()
                .add_filter("Experience config", &["json"])
                .set_title("Open Experience Config")
                .pick_file();
            let _ = sender.send(FileDialogResult { path });
        });
    }

    /// Poll for completed dialogs (non-blocking)
    fn poll(&mut self) -> Option<FileDialogResult> {
        match self.receiver.try_recv() {
            Ok(result) => {
                self.dialog_open = false;
                Some(result)
            }
            Err(_) => None,
        }
    }
}

/// Application state machine
enum AppState {
    /// Initial state before window is created
    Uninitialized {
        config: ExperienceConfig,
        preferences: AppPreferences,
    },
    /// Window and graphics context are ready
    Running {
        window: Arc<Window>,
        app: App,
        preferences: AppPreferences,
        file_dialogs: AsyncFileDialogs,
    },
}

struct ArStageApp {
    state: AppState,
    /// Next scheduled redraw for manual frame pacing
    next_redraw_at: Instant,
}

impl ArStageApp {
    fn new(config: ExperienceConfig, preferences: AppPreferences) -> Self {
        Self {
            state: AppState::Uninitialized {
                config,
                preferences,
            },
            next_redraw_at: Instant::now(),
        }
    }
}

impl ApplicationHandler for ArStageApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // Only initialize if we haven't already
        if let AppState::Uninitialized {
            config,
            preferences,
        } = &self.state
        {
            tracing::info!("Creating window...");

            let config = config.clone();
            let preferences = preferences.clone();

            let window_attributes = WindowAttributes::default()
                .with_title(WINDOW_TITLE)
                .with_inner_size(LogicalSize::new(
                    preferences.window_width,
                    preferences.window_height,
                ));

            let window = Arc::new(
                event_loop
                    .create_window(window_attributes)
                    .expect("Failed to create window"),
            );
            window.focus_window();

            tracing::info!("Initializing wgpu and egui...");
            let manager = SessionManager::new(config, demo_tracker_factory());
            let mut app = pollster::block_on(App::new(window.clone(), manager));

            // Auto-load the first experience
            if !app.manager.config().experiences.is_empty() {
                app.manager.load_experience(0);
            }

            tracing::info!("AR Stage ready!");
            tracing::info!("Press ESC to exit, F11 for fullscreen");

            self.state = AppState::Running {
                window,
                app,
                preferences,
                file_dialogs: AsyncFileDialogs::new(),
            };
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let AppState::Running {
            window,
            app,
            preferences,
            file_dialogs,
        } = &mut self.state
        else {
            return;
        };

        // Let egui handle the event first
        let _egui_consumed = app.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Close requested, exiting...");
                if let Err(error) = preferences.save() {
                    tracing::warn!("Failed to save preferences: {}", error);
                }
                event_loop.exit();
            }

            // Handle keyboard input (only if egui doesn't want it)
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } if !app.egui_wants_keyboard() => match key_code {
                KeyCode::Escape => {
                    tracing::info!("Escape pressed, exiting...");
                    if let Err(error) = preferences.save() {
                        tracing::warn!("Failed to save preferences: {}", error);
                    }
                    event_loop.exit();
                }
                // F11 to toggle fullscreen
                KeyCode::F11 => {
                    if window.fullscreen().is_some() {
                        window.set_fullscreen(None);
                        tracing::info!("Exiting fullscreen");
                    } else {
                        window.set_fullscreen(Some(winit::window::Fullscreen::Borderless(None)));
                        tracing::info!("Entering fullscreen");
                    }
                }
                _ => {}
            },

            // Handle window resize
            WindowEvent::Resized(physical_size) => {
                app.resize(physical_size);
                preferences.set_window_size(physical_size.width, physical_size.height);
            }

            // Handle redraw request
            WindowEvent::RedrawRequested => {
                // Complete any finished config dialog
                if let Some(result) = file_dialogs.poll() {
                    if let Some(path) = result.path {
                        match ExperienceConfig::load_from_file(&path) {
                            Ok(config) => {
                                tracing::info!("Loaded config: {}", path.display());
                                app.replace_config(config, demo_tracker_factory());
                                if !app.manager.config().experiences.is_empty() {
                                    app.manager.load_experience(0);
                                }
                                preferences.set_last_config(&path);
                            }
                            Err(error) => {
                                tracing::error!(
                                    "Failed to load config {}: {}",
                                    path.display(),
                                    error
                                );
                            }
                        }
                    }
                }

                app.update();

                match app.render() {
                    Ok(actions) => {
                        for action in actions {
                            match action {
                                MenuAction::Load(index) => app.manager.load_experience(index),
                                MenuAction::OpenConfig => file_dialogs.spawn_open_config(),
                            }
                        }
                    }
                    Err(wgpu::SurfaceError::Lost) => {
                        tracing::warn!("Surface lost, reconfiguring...");
                        app.resize(app.size());
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        tracing::error!("Out of GPU memory!");
                        event_loop.exit();
                    }
                    Err(error) => {
                        tracing::warn!("Surface error: {:?}", error);
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let AppState::Running { window, .. } = &self.state else {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        };

        // Integer nanoseconds to eliminate floating-point drift
        let frame_duration = Duration::from_nanos(1_000_000_000 / TARGET_FPS);

        let now = Instant::now();

        // Check if we're within 2ms of target - if so, spin-wait for precision
        let spin_threshold = Duration::from_micros(2000);
        if now < self.next_redraw_at {
            if self.next_redraw_at.duration_since(now) <= spin_threshold {
                // Spin-wait the final microseconds
                while Instant::now() < self.next_redraw_at {
                    std::hint::spin_loop();
                }
            } else {
                // Still waiting - wake 1ms early next time
                let wake_at = self
                    .next_redraw_at
                    .checked_sub(Duration::from_micros(1000))
                    .unwrap_or(self.next_redraw_at);
                event_loop.set_control_flow(ControlFlow::WaitUntil(wake_at));
                return;
            }
        }

        // Time to render
        window.request_redraw();

        self.next_redraw_at += frame_duration;

        // Reset if more than 2 frames behind
        if Instant::now() > self.next_redraw_at + frame_duration * 2 {
            self.next_redraw_at = Instant::now() + frame_duration;
        }

        // Schedule next wake 1ms early
        let wake_at = self
            .next_redraw_at
            .checked_sub(Duration::from_micros(1000))
            .unwrap_or(self.next_redraw_at);
        event_loop.set_control_flow(ControlFlow::WaitUntil(wake_at));
    }
}

/// Resolve the experience config: explicit argument, then the last opened
/// file, then `experiences.json` in the working directory
fn resolve_config(preferences: &AppPreferences) -> Result<ExperienceConfig, String> {
    if let Some(arg) = std::env::args().nth(1) {
        let path = PathBuf::from(&arg);
        return ExperienceConfig::load_from_file(&path)
            .map_err(|error| format!("Failed to load {}: {}", path.display(), error));
    }

    if let Some(path) = preferences.get_last_config() {
        match ExperienceConfig::load_from_file(&path) {
            Ok(config) => {
                tracing::info!("Loaded last config: {}", path.display());
                return Ok(config);
            }
            Err(error) => {
                tracing::warn!("Failed to load last config {}: {}", path.display(), error);
            }
        }
    }

    let path = PathBuf::from("experiences.json");
    ExperienceConfig::load_from_file(&path).map_err(|error| {
        format!(
            "No experience config found ({}: {})\nUsage: ar-stage [config.json]",
            path.display(),
            error
        )
    })
}

fn main() {
    // Initialize logging with tracing
    use ar_stage::telemetry::{init_logging, LogConfig};
    let log_config = LogConfig {
        console_enabled: true,
        file_enabled: false,
        file_path: None,
        json_format: false,
        default_level: "info".to_string(),
    };
    // Keep the guard alive for the program duration
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!("AR Stage v0.1.0");

    let preferences = AppPreferences::load();

    let config = match resolve_config(&preferences) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(1);
        }
    };

    tracing::info!("{} experiences available", config.experiences.len());

    // Create event loop
    let event_loop = EventLoop::new().expect("Failed to create event loop");

    // Default to sleeping; we explicitly schedule redraws in `about_to_wait`.
    event_loop.set_control_flow(ControlFlow::Wait);

    // Create and run application
    let mut app = ArStageApp::new(config, preferences);
    event_loop.run_app(&mut app).expect("Event loop error");
}
