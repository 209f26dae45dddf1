//! Session lifecycle
//!
//! Owns the experience configuration and drives the
//! IDLE → DISPOSING → STARTING → {ACTIVE | FAILED} state machine. Disposal
//! runs synchronously inside `load_experience`; tracker start runs on a
//! background thread and resolves through `poll`, guarded by a generation
//! counter and cancel flag so a newer selection always wins.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::config::ExperienceConfig;
use crate::session::session::ArSession;
use crate::tracking::{TrackingError, TrackingSource};

/// Session lifecycle errors
#[derive(Debug)]
pub enum SessionError {
    /// The tracking source failed to start
    Start(TrackingError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Start(e) => write!(f, "failed to start tracking: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<TrackingError> for SessionError {
    fn from(e: TrackingError) -> Self {
        SessionError::Start(e)
    }
}

/// Lifecycle state, advanced by `load_experience` and `poll`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Disposing,
    Starting,
    Active,
    Failed,
}

/// Builds an unstarted tracking source for a marker-target file
pub type TrackerFactory = Box<dyn Fn(&Path) -> Box<dyn TrackingSource> + Send + Sync>;

struct StartResult {
    generation: u64,
    experience_index: usize,
    result: Result<Box<dyn TrackingSource>, SessionError>,
}

/// Drives experience switching
pub struct SessionManager {
    config: ExperienceConfig,
    tracker_factory: TrackerFactory,
    state: SessionState,
    session: Option<ArSession>,
    active_index: Option<usize>,
    last_error: Option<String>,
    generation: u64,
    cancel: Arc<AtomicBool>,
    results_tx: Sender<StartResult>,
    results_rx: Receiver<StartResult>,
}

impl SessionManager {
    pub fn new(config: ExperienceConfig, tracker_factory: TrackerFactory) -> Self {
        let (results_tx, results_rx) = mpsc::channel();
        Self {
            config,
            tracker_factory,
            state: SessionState::Idle,
            session: None,
            active_index: None,
            last_error: None,
            generation: 0,
            cancel: Arc::new(AtomicBool::new(false)),
            results_tx,
            results_rx,
        }
    }

    /// Switch to the experience at `index`
    ///
    /// No-op when it is already the active one. Otherwise the current
    /// session is disposed synchronously, any in-flight start is cancelled,
    /// and a new tracker start is spawned; `poll` picks up the result.
    pub fn load_experience(&mut self, index: usize) {
        if self.active_index == Some(index) {
            tracing::debug!("Experience {} already active, ignoring", index);
            return;
        }
        let Some(experience) = self.config.experiences.get(index) else {
            tracing::warn!("Experience index {} out of range, ignoring", index);
            return;
        };

        // Recorded before any async work so a re-entrant selection no-ops
        self.active_index = Some(index);
        self.last_error = None;

        self.state = SessionState::Disposing;
        if let Some(mut session) = self.session.take() {
            session.dispose();
        }

        // Supersede any start still in flight
        self.cancel.store(true, Ordering::Release);
        self.cancel = Arc::new(AtomicBool::new(false));
        self.generation += 1;

        self.state = SessionState::Starting;
        let generation = self.generation;
        let name = experience.name.clone();
        let targets_path = self.config.targets_path(experience);
        let mut tracker = (self.tracker_factory)(&targets_path);
        let cancel = Arc::clone(&self.cancel);
        let tx = self.results_tx.clone();

        tracing::info!("Starting experience '{}' (generation {})", name, generation);
        std::thread::spawn(move || {
            let result = match tracker.start() {
                Ok(()) => Ok(tracker),
                Err(e) => Err(SessionError::from(e)),
            };

            if cancel.load(Ordering::Acquire) {
                tracing::debug!("Start of '{}' cancelled, discarding", name);
                if let Ok(mut tracker) = result {
                    tracker.stop();
                }
                return;
            }

            let _ = tx.send(StartResult {
                generation,
                experience_index: index,
                result,
            });
        });
    }

    /// Drain finished start attempts; called once per frame
    pub fn poll(&mut self) {
        while let Ok(start) = self.results_rx.try_recv() {
            if start.generation != self.generation {
                tracing::debug!(
                    "Discarding stale start result (generation {})",
                    start.generation
                );
                if let Ok(mut tracker) = start.result {
                    tracker.stop();
                }
                continue;
            }

            match start.result {
                Ok(tracker) => {
                    let Some(experience) = self.config.experiences.get(start.experience_index)
                    else {
                        continue;
                    };
                    tracing::info!("Experience '{}' active", experience.name);
                    let session = ArSession::create(
                        start.experience_index,
                        experience,
                        &self.config,
                        tracker,
                    );
                    self.session = Some(session);
                    self.state = SessionState::Active;
                }
                Err(e) => {
                    tracing::error!("Session start failed: {}", e);
                    self.last_error = Some(e.to_string());
                    self.state = SessionState::Failed;
                    // Cleared so selecting the same entry again retries
                    self.active_index = None;
                }
            }
        }
    }

    /// Dispose the active session and cancel any in-flight start
    pub fn dispose_active(&mut self) {
        self.cancel.store(true, Ordering::Release);
        self.generation += 1;
        if let Some(mut session) = self.session.take() {
            session.dispose();
        }
        self.active_index = None;
        self.state = SessionState::Idle;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active_index
    }

    pub fn session(&self) -> Option<&ArSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut ArSession> {
        self.session.as_mut()
    }

    pub fn config(&self) -> &ExperienceConfig {
        &self.config
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::TrackingEvent;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Probe {
        started: Arc<AtomicBool>,
        stopped: Arc<AtomicBool>,
        delay: Duration,
        fail: bool,
    }

    impl TrackingSource for Probe {
        fn start(&mut self) -> Result<(), TrackingError> {
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(TrackingError::Device("probe start refused".into()));
            }
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
        fn register_target(&mut self, _: crate::tracking::TargetId) {}
        fn poll_events(&mut self) -> Vec<TrackingEvent> {
            Vec::new()
        }
    }

    struct ProbeHandle {
        path: PathBuf,
        stopped: Arc<AtomicBool>,
    }

    type ProbeLog = Arc<Mutex<Vec<ProbeHandle>>>;

    fn probe_factory(log: ProbeLog, fail: bool, slow_folder: Option<&'static str>) -> TrackerFactory {
        Box::new(move |path: &Path| {
            let delay = match slow_folder {
                Some(folder) if path.to_string_lossy().contains(folder) => {
                    Duration::from_millis(150)
                }
                _ => Duration::ZERO,
            };
            let started = Arc::new(AtomicBool::new(false));
            let stopped = Arc::new(AtomicBool::new(false));
            log.lock().unwrap().push(ProbeHandle {
                path: path.to_path_buf(),
                stopped: Arc::clone(&stopped),
            });
            Box::new(Probe {
                started,
                stopped,
                delay,
                fail,
            })
        })
    }

    fn two_experience_config() -> ExperienceConfig {
        serde_json::from_str(
            r#"{
                "basePath": "/nonexistent",
                "thumbsFile": "thumb.png",
                "targetsFile": "targets.mind",
                "videoFolder": "videos",
                "imageFolder": "images",
                "glbFolder": "models",
                "experiences": [
                    {
                        "name": "Alpha",
                        "folder": "alpha",
                        "targets": [{ "targetIndex": 0, "image": "missing.png" }]
                    },
                    {
                        "name": "Beta",
                        "folder": "beta",
                        "targets": [{ "targetIndex": 1, "image": "missing.png" }]
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    fn poll_until_settled(manager: &mut SessionManager) {
        for _ in 0..500 {
            manager.poll();
            if manager.state() != SessionState::Starting {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("manager never left STARTING");
    }

    fn wait_for(flag: &Arc<AtomicBool>) {
        for _ in 0..500 {
            if flag.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("flag never set");
    }

    #[test]
    fn test_load_reaches_active() {
        let log: ProbeLog = Arc::default();
        let mut manager =
            SessionManager::new(two_experience_config(), probe_factory(log.clone(), false, None));
        assert_eq!(manager.state(), SessionState::Idle);

        manager.load_experience(0);
        assert_eq!(manager.state(), SessionState::Starting);

        poll_until_settled(&mut manager);
        assert_eq!(manager.state(), SessionState::Active);
        assert_eq!(manager.active_index(), Some(0));

        let session = manager.session().unwrap();
        assert_eq!(session.experience_index(), 0);
        assert_eq!(session.pass_count(), 2);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].path.ends_with("alpha/targets.mind"));
    }

    #[test]
    fn test_reselect_active_index_is_noop() {
        let log: ProbeLog = Arc::default();
        let mut manager =
            SessionManager::new(two_experience_config(), probe_factory(log.clone(), false, None));
        manager.load_experience(0);
        poll_until_settled(&mut manager);

        let generation = manager.generation();
        manager.load_experience(0);

        assert_eq!(manager.state(), SessionState::Active);
        assert_eq!(manager.generation(), generation);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_start_allows_retry() {
        let log: ProbeLog = Arc::default();
        let mut manager =
            SessionManager::new(two_experience_config(), probe_factory(log.clone(), true, None));

        manager.load_experience(0);
        poll_until_settled(&mut manager);
        assert_eq!(manager.state(), SessionState::Failed);
        assert!(manager.session().is_none());
        assert!(manager.active_index().is_none());
        assert!(manager.last_error().is_some());

        // Re-selecting the same entry starts over instead of no-opping
        manager.load_experience(0);
        assert_eq!(manager.state(), SessionState::Starting);
        poll_until_settled(&mut manager);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_switch_mid_start_discards_stale() {
        let log: ProbeLog = Arc::default();
        let mut manager = SessionManager::new(
            two_experience_config(),
            probe_factory(log.clone(), false, Some("alpha")),
        );

        manager.load_experience(0);
        manager.load_experience(1);
        poll_until_settled(&mut manager);

        assert_eq!(manager.state(), SessionState::Active);
        assert_eq!(manager.active_index(), Some(1));
        assert_eq!(manager.session().unwrap().experience_index(), 1);

        // The superseded tracker ends up stopped, not leaked
        let alpha_stopped = log.lock().unwrap()[0].stopped.clone();
        wait_for(&alpha_stopped);
    }

    #[test]
    fn test_a_b_a_leaves_single_session() {
        let log: ProbeLog = Arc::default();
        let mut manager =
            SessionManager::new(two_experience_config(), probe_factory(log.clone(), false, None));

        manager.load_experience(0);
        poll_until_settled(&mut manager);
        manager.load_experience(1);
        poll_until_settled(&mut manager);
        manager.load_experience(0);
        poll_until_settled(&mut manager);

        assert_eq!(manager.state(), SessionState::Active);
        assert_eq!(manager.active_index(), Some(0));
        let session = manager.session().unwrap();
        assert_eq!(session.experience_index(), 0);
        assert_eq!(session.mixer_count(), 0);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert!(log[0].stopped.load(Ordering::SeqCst));
        assert!(log[1].stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_out_of_range_index_ignored() {
        let log: ProbeLog = Arc::default();
        let mut manager =
            SessionManager::new(two_experience_config(), probe_factory(log.clone(), false, None));

        manager.load_experience(99);
        assert_eq!(manager.state(), SessionState::Idle);
        assert!(manager.active_index().is_none());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dispose_active_returns_to_idle() {
        let log: ProbeLog = Arc::default();
        let mut manager =
            SessionManager::new(two_experience_config(), probe_factory(log.clone(), false, None));
        manager.load_experience(0);
        poll_until_settled(&mut manager);

        manager.dispose_active();
        assert_eq!(manager.state(), SessionState::Idle);
        assert!(manager.session().is_none());
        assert!(manager.active_index().is_none());
        assert!(log.lock().unwrap()[0].stopped.load(Ordering::SeqCst));
    }
}
