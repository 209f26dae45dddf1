//! Experience menu
//!
//! Bottom strip of cover thumbnails for switching experiences, with a
//! status line for the session lifecycle and a small credits window
//! behind the attribution label.

use egui::{Color32, RichText};

use crate::session::{SessionManager, SessionState};
use crate::ui::thumbnail_cache::ThumbnailCache;

const THUMB_SIZE: f32 = 72.0;

/// Actions that can be returned from the menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    /// Load the experience at this index
    Load(usize),
    /// Pick a different experience config file
    OpenConfig,
}

/// State for the experience menu
pub struct ExperienceMenu {
    thumbnails: ThumbnailCache,
    show_credits: bool,
}

impl ExperienceMenu {
    pub fn new() -> Self {
        Self {
            thumbnails: ThumbnailCache::new(),
            show_credits: false,
        }
    }

    /// Drop cached thumbnails, e.g. after a config reload
    pub fn reset(&mut self) {
        self.thumbnails.clear();
    }

    /// Render the menu panel and credits window
    pub fn render(&mut self, ctx: &egui::Context, manager: &SessionManager) -> Vec<MenuAction> {
        self.thumbnails.poll(ctx);

        let mut actions = Vec::new();

        let frame = egui::Frame::new()
            .fill(Color32::from_rgba_unmultiplied(10, 10, 14, 200))
            .inner_margin(egui::Margin::symmetric(12, 8));

        egui::TopBottomPanel::bottom("experience_menu")
            .frame(frame)
            .show_separator_line(false)
            .show(ctx, |ui| {
                self.render_header(ui, manager, &mut actions);
                ui.add_space(4.0);
                self.render_strip(ui, manager, &mut actions);
            });

        if self.show_credits {
            self.render_credits(ctx, manager);
        }

        actions
    }

    fn render_header(
        &mut self,
        ui: &mut egui::Ui,
        manager: &SessionManager,
        actions: &mut Vec<MenuAction>,
    ) {
        ui.horizontal(|ui| {
            if let Some(status) = status_line(manager) {
                ui.label(status);
            } else if let Some(experience) = manager
                .active_index()
                .and_then(|index| manager.config().experiences.get(index))
            {
                ui.label(RichText::new(&experience.name).strong());
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui
                    .button("📂")
                    .on_hover_text("Open an experience config")
                    .clicked()
                {
                    actions.push(MenuAction::OpenConfig);
                }
                if ui.link("AR Stage").clicked() {
                    self.show_credits = !self.show_credits;
                }
            });
        });
    }

    fn render_strip(
        &mut self,
        ui: &mut egui::Ui,
        manager: &SessionManager,
        actions: &mut Vec<MenuAction>,
    ) {
        egui::ScrollArea::horizontal().show(ui, |ui| {
            ui.horizontal(|ui| {
                for (index, experience) in manager.config().experiences.iter().enumerate() {
                    let path = manager.config().thumb_path(experience);
                    let key = path.display().to_string();
                    self.thumbnails.request(key.clone(), path);

                    let selected = manager.active_index() == Some(index);
                    let size = egui::vec2(THUMB_SIZE, THUMB_SIZE);
                    let response = match self.thumbnails.get(&key) {
                        Some(texture) => {
                            let image = egui::Image::new(texture)
                                .fit_to_exact_size(size)
                                .corner_radius(4.0);
                            ui.add(egui::ImageButton::new(image).selected(selected))
                        }
                        None => {
                            ui.add_sized(size, egui::Button::new(&experience.name).selected(selected))
                        }
                    };

                    if response.on_hover_text(&experience.name).clicked() {
                        actions.push(MenuAction::Load(index));
                    }
                }
            });
        });
    }

    fn render_credits(&mut self, ctx: &egui::Context, manager: &SessionManager) {
        egui::Window::new("Credits")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(RichText::new("AR Stage").heading());
                ui.label("Target-tracked media player");
                ui.separator();
                for experience in &manager.config().experiences {
                    ui.label(&experience.name);
                }
                ui.add_space(8.0);
                if ui.button("Close").clicked() {
                    self.show_credits = false;
                }
            });
    }
}

impl Default for ExperienceMenu {
    fn default() -> Self {
        Self::new()
    }
}

/// Status for the header row, if the session is in a transient state
fn status_line(manager: &SessionManager) -> Option<RichText> {
    match manager.state() {
        SessionState::Starting => Some(RichText::new("Loading experience...").color(Color32::GRAY)),
        SessionState::Active => manager
            .session()
            .filter(|session| session.is_scanning())
            .map(|_| RichText::new("Scanning for targets...").color(Color32::GRAY)),
        SessionState::Failed => {
            let text = match manager.last_error() {
                Some(error) => format!("Failed to start: {error}"),
                None => "Failed to start".to_string(),
            };
            Some(RichText::new(text).color(Color32::from_rgb(240, 90, 90)))
        }
        SessionState::Idle | SessionState::Disposing => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExperienceConfig;
    use crate::tracking::{ScriptedSource, TrackingSource};
    use std::path::Path;
    use std::time::Duration;

    fn test_manager() -> SessionManager {
        let json = r#"{
            "basePath": "/nonexistent/experiences",
            "thumbsFile": "thumb.png",
            "targetsFile": "targets.mind",
            "videoFolder": "videos",
            "imageFolder": "images",
            "glbFolder": "models",
            "experiences": [
                {
                    "name": "Alpha",
                    "folder": "alpha",
                    "targets": [
                        { "targetIndex": 0, "image": "a.jpg" }
                    ]
                }
            ]
        }"#;
        let config: ExperienceConfig = serde_json::from_str(json).unwrap();
        let factory = Box::new(|path: &Path| {
            Box::new(ScriptedSource::new(path)) as Box<dyn TrackingSource>
        });
        SessionManager::new(config, factory)
    }

    #[test]
    fn test_status_idle_is_none() {
        let manager = test_manager();
        assert!(status_line(&manager).is_none());
    }

    #[test]
    fn test_status_reports_start_failure() {
        let mut manager = test_manager();
        manager.load_experience(0);
        for _ in 0..500 {
            manager.poll();
            if manager.state() == SessionState::Failed {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(manager.state(), SessionState::Failed);

        let status = status_line(&manager).unwrap();
        assert!(status.text().contains("Failed to start"));
    }

    #[test]
    fn test_render_without_clicks_returns_no_actions() {
        let manager = test_manager();
        let mut menu = ExperienceMenu::new();
        let ctx = egui::Context::default();
        let _ = ctx.run(Default::default(), |ctx| {
            let actions = menu.render(ctx, &manager);
            assert!(actions.is_empty());
        });
    }
}
