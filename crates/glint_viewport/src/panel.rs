//! Side panel with render progress and controls.

use glint_math::Color;
use glint_tracer::RenderState;

/// Read-only numbers shown in the panel for one frame.
#[derive(Debug, Clone, Copy)]
pub struct PanelStats {
    pub state: RenderState,
    pub sample_count: u32,
    /// Percent of the current pass, `[0, 100]`.
    pub progress: f32,
    pub fps: f32,
    pub resolution: (u32, u32),
    pub background: Color,
}

/// Something the user asked for this frame. Applied by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PanelAction {
    Pause,
    Resume,
    Reset,
    SetBackground(Color),
    SaveSnapshot,
}

/// Draw the panel and collect the actions triggered this frame.
pub fn show(ctx: &egui::Context, stats: &PanelStats) -> Vec<PanelAction> {
    let mut actions = Vec::new();

    egui::SidePanel::left("render_panel")
        .default_width(260.0)
        .show(ctx, |ui| {
            ui.heading("Glint");
            ui.separator();

            ui.label(format!("FPS: {:.1}", stats.fps));
            ui.separator();

            ui.collapsing("Progress", |ui| {
                ui.label(format!("State: {:?}", stats.state));
                ui.label(format!("Samples: {}", stats.sample_count));
                ui.add(egui::ProgressBar::new(stats.progress / 100.0).show_percentage());
            });

            ui.separator();

            ui.collapsing("Viewport", |ui| {
                let (width, height) = stats.resolution;
                ui.label(format!("Resolution: {}x{}", width, height));
                if height > 0 {
                    ui.label(format!("Aspect: {:.3}", width as f32 / height as f32));
                }

                ui.horizontal(|ui| {
                    ui.label("Background");
                    let mut rgb = stats.background.to_array();
                    if ui.color_edit_button_rgb(&mut rgb).changed() {
                        actions.push(PanelAction::SetBackground(Color::from_array(rgb)));
                    }
                });
            });

            ui.separator();

            ui.horizontal(|ui| {
                match stats.state {
                    RenderState::Running => {
                        if ui.button("Pause").clicked() {
                            actions.push(PanelAction::Pause);
                        }
                    }
                    RenderState::Paused => {
                        if ui.button("Resume").clicked() {
                            actions.push(PanelAction::Resume);
                        }
                    }
                    RenderState::Terminated => {}
                }
                if ui.button("Reset").clicked() {
                    actions.push(PanelAction::Reset);
                }
                if ui.button("Save").clicked() {
                    actions.push(PanelAction::SaveSnapshot);
                }
            });

            ui.separator();

            ui.collapsing("Controls", |ui| {
                ui.label("Left Mouse: Tumble (orbit)");
                ui.label("Scroll Wheel: Dolly (zoom)");
                ui.label("Space: Pause / resume");
                ui.label("R: Restart accumulation");
                ui.label("P: Save snapshot");
                ui.label("Tab: Toggle panel");
            });
        });

    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(state: RenderState) -> PanelStats {
        PanelStats {
            state,
            sample_count: 12,
            progress: 40.0,
            fps: 60.0,
            resolution: (640, 360),
            background: Color::new(0.1, 0.2, 0.3),
        }
    }

    fn run_frame(ctx: &egui::Context, stats: &PanelStats) -> (Vec<PanelAction>, egui::FullOutput) {
        let mut actions = Vec::new();
        let output = ctx.run(egui::RawInput::default(), |ctx| {
            actions = show(ctx, stats);
        });
        (actions, output)
    }

    #[test]
    fn test_idle_frame_has_no_actions() {
        let ctx = egui::Context::default();
        for state in [RenderState::Running, RenderState::Paused, RenderState::Terminated] {
            let (actions, output) = run_frame(&ctx, &stats(state));
            assert!(actions.is_empty());
            assert!(!output.shapes.is_empty());
        }
    }
}
