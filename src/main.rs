#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use eframe::egui;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pcb_inspect::app::{APP_TITLE, WINDOW_SIZE};
use pcb_inspect::{AppConfig, InspectionApp, PcbDetector};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    info!("using model {}", config.model_path.display());
    let detector = PcbDetector::from_config(&config);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(WINDOW_SIZE)
            .with_title(APP_TITLE),
        ..Default::default()
    };

    if let Err(e) = eframe::run_native(
        APP_TITLE,
        options,
        Box::new(move |_cc| Ok(Box::new(InspectionApp::new(config, detector)))),
    ) {
        error!("error running native application: {}", e);
        return Err(anyhow::anyhow!("{}", e));
    }
    Ok(())
}
