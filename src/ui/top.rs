use eframe::egui;

use crate::app::InspectionApp;

pub fn top_panel(app: &mut InspectionApp, ctx: &egui::Context) {
    egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
        ui.horizontal(|ui| {
            match &app.current_image_path {
                Some(path) => ui.label(format!("Image: {}", path.display())),
                None => ui.label("No image loaded"),
            };

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                match app.detector_error() {
                    Some(_) => ui.colored_label(egui::Color32::RED, "Model unavailable"),
                    None => ui.label(format!("Model: {}", app.config.model_path.display())),
                };
            });
        });
    });
}
