use std::fs;
use std::path::{Path, PathBuf};

use eframe::egui;
use image::{DynamicImage, Rgb, RgbImage};

pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Images directly inside `dir`, sorted by path.
pub fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_image_file(path))
        .collect();
    files.sort();
    Ok(files)
}

pub fn resize_to_limit(img: &DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let width = img.width();
    let height = img.height();

    if width <= max_width && height <= max_height {
        return img.clone();
    }

    let ratio = (max_width as f32 / width as f32).min(max_height as f32 / height as f32);

    let new_width = ((width as f32 * ratio) as u32).max(1);
    let new_height = ((height as f32 * ratio) as u32).max(1);

    img.resize_exact(new_width, new_height, image::imageops::FilterType::Triangle)
}

/// Preview that fits a `size` x `size` square. Never upscales.
pub fn thumbnail(img: &DynamicImage, size: u32) -> DynamicImage {
    resize_to_limit(img, size, size)
}

pub fn to_color_image(img: &DynamicImage) -> egui::ColorImage {
    let rgba = img.to_rgba8();
    egui::ColorImage::from_rgba_unmultiplied(
        [rgba.width() as usize, rgba.height() as usize],
        rgba.as_raw(),
    )
}

/// White square shown when the placeholder image is missing.
pub fn blank_placeholder(size: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(size, size, Rgb([255, 255, 255])))
}
