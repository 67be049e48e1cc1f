use eframe::egui;

use crate::app::{InspectionApp, Panel};

pub fn central_panel(app: &mut InspectionApp, ctx: &egui::Context) {
    egui::CentralPanel::default().show(ctx, |ui| {
        ui.horizontal_top(|ui| {
            image_panel(app, ui, Panel::Original, "Original");
            image_panel(app, ui, Panel::Predicted, "Prediction");
        });
    });
}

fn image_panel(app: &mut InspectionApp, ui: &mut egui::Ui, panel: Panel, caption: &str) {
    let texture = app.preview_texture(ui.ctx(), panel);
    let size = texture.size_vec2();

    egui::Frame::group(ui.style()).show(ui, |ui| {
        ui.vertical(|ui| {
            ui.label(caption);
            let response = ui
                .add(
                    egui::Image::new((texture.id(), size))
                        .fit_to_exact_size(size)
                        .sense(egui::Sense::click()),
                )
                .on_hover_text("Click to inspect");

            if response.clicked() {
                app.open_viewer(panel);
            }
        });
    });
}
