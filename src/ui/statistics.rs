use eframe::egui;

use crate::app::{InspectionApp, StatusKind};

const CONTROL_PANEL_WIDTH: f32 = 220.0;

pub fn statistics_panel(app: &mut InspectionApp, ctx: &egui::Context) {
    egui::SidePanel::right("control_panel")
        .default_width(CONTROL_PANEL_WIDTH)
        .show(ctx, |ui| {
            ui.heading("Defects");
            egui::Grid::new("defect_counts")
                .num_columns(2)
                .striped(true)
                .show(ui, |ui| {
                    for (label, count) in app.counts.by_label() {
                        ui.label(label);
                        ui.label(count.to_string());
                        ui.end_row();
                    }
                });

            ui.separator();
            ui.horizontal(|ui| {
                ui.label("Threshold");
                ui.label(app.score_threshold.to_string());
            });

            let entry = ui.add(
                egui::TextEdit::singleline(&mut app.score_input).hint_text("between 0 and 1"),
            );
            if entry.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                app.change_score();
            }
            if ui.button("Change Score").clicked() {
                app.change_score();
            }

            ui.separator();
            if ui.button("Add Image").clicked() {
                app.add_image();
            }
            ui.horizontal(|ui| {
                let busy = app.is_detecting();
                if ui
                    .add_enabled(!busy, egui::Button::new("Run Detection"))
                    .clicked()
                {
                    app.run_detection();
                }
                if busy {
                    ui.label("Detecting...");
                }
            });

            // push the status line to the bottom
            ui.add_space((ui.available_height() - 30.0).max(0.0));

            if let Some(status) = &app.status_message {
                let color = match status.kind {
                    StatusKind::Info => ui.visuals().text_color(),
                    StatusKind::Error => egui::Color32::RED,
                };
                ui.horizontal_wrapped(|ui| {
                    ui.colored_label(color, &status.text);
                });
            }
        });
}
