//! Secondary zoom/pan window over a single image.

use eframe::egui;
use image::DynamicImage;

use crate::utils::{resize_to_limit, to_color_image};

pub const VIEWER_SIZE: [f32; 2] = [900.0, 700.0];

/// Zoom factor and pan offset of a viewer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomPan {
    zoom: f32,
    step: f32,
    offset: egui::Vec2,
}

impl ZoomPan {
    pub fn new(step: f32) -> Self {
        Self {
            zoom: 1.0,
            step,
            offset: egui::Vec2::ZERO,
        }
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn offset(&self) -> egui::Vec2 {
        self.offset
    }

    pub fn zoom_in(&mut self) {
        self.zoom *= self.step;
    }

    pub fn zoom_out(&mut self) {
        self.zoom /= self.step;
    }

    /// One wheel notch: up zooms in, down zooms out.
    pub fn scroll(&mut self, delta_y: f32) {
        if delta_y > 0.0 {
            self.zoom_in();
        } else if delta_y < 0.0 {
            self.zoom_out();
        }
    }

    pub fn pan(&mut self, delta: egui::Vec2) {
        self.offset += delta;
    }

    /// On-screen size of an image of `width` x `height` pixels.
    pub fn displayed_size(&self, width: u32, height: u32) -> egui::Vec2 {
        egui::vec2(
            (width as f32 * self.zoom).floor().max(1.0),
            (height as f32 * self.zoom).floor().max(1.0),
        )
    }
}

pub struct ViewerWindow {
    id: egui::ViewportId,
    title: String,
    image: DynamicImage,
    texture: Option<egui::TextureHandle>,
    zoom_pan: ZoomPan,
    open: bool,
}

impl ViewerWindow {
    pub fn new(serial: u64, title: &str, image: DynamicImage, zoom_step: f32) -> Self {
        Self {
            id: egui::ViewportId::from_hash_of(("viewer", serial)),
            title: title.to_string(),
            image,
            texture: None,
            zoom_pan: ZoomPan::new(zoom_step),
            open: true,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn zoom_pan(&self) -> &ZoomPan {
        &self.zoom_pan
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Show the viewer; returns false once it has been closed.
    pub fn show(&mut self, ctx: &egui::Context) -> bool {
        let builder = egui::ViewportBuilder::default()
            .with_title(self.title.clone())
            .with_inner_size(VIEWER_SIZE);

        ctx.show_viewport_immediate(self.id, builder, |ctx, class| {
            if class == egui::ViewportClass::Embedded {
                // backend without multi-viewport support
                let mut open = self.open;
                egui::Window::new(self.title.clone())
                    .id(egui::Id::new(self.id))
                    .open(&mut open)
                    .default_size(VIEWER_SIZE)
                    .show(ctx, |ui| self.canvas(ui));
                self.open = open;
            } else {
                egui::CentralPanel::default()
                    .frame(egui::Frame::default().fill(egui::Color32::BLACK))
                    .show(ctx, |ui| self.canvas(ui));
                if ctx.input(|i| i.viewport().close_requested()) {
                    self.open = false;
                }
            }
        });

        self.open
    }

    fn canvas(&mut self, ui: &mut egui::Ui) {
        let (rect, response) =
            ui.allocate_exact_size(ui.available_size(), egui::Sense::click_and_drag());
        ui.painter().rect_filled(rect, 0.0, egui::Color32::BLACK);

        if response.dragged() {
            self.zoom_pan.pan(response.drag_delta());
        }
        if response.hovered() {
            let scroll = ui.input(|i| i.raw_scroll_delta.y);
            self.zoom_pan.scroll(scroll);
        }

        let image = &self.image;
        let texture = self.texture.get_or_insert_with(|| {
            let max_side = ui.ctx().input(|i| i.max_texture_side) as u32;
            let limited = resize_to_limit(image, max_side, max_side);
            ui.ctx()
                .load_texture("viewer_image", to_color_image(&limited), Default::default())
        });

        let size = self
            .zoom_pan
            .displayed_size(self.image.width(), self.image.height());
        let image_rect = egui::Rect::from_min_size(rect.min + self.zoom_pan.offset(), size);
        ui.painter().with_clip_rect(rect).image(
            texture.id(),
            image_rect,
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            egui::Color32::WHITE,
        );
    }
}
