mod animations;
mod app_state;
mod capability;
mod config;
mod field;
mod gallery;
mod gpu;
mod loader;
mod trajectory;
mod ui;
mod viewer;

use std::path::PathBuf;

use anyhow::Result;

fn main() -> Result<()> {
    let folder = std::env::args().nth(1).map(PathBuf::from);
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Pointillist")
            .with_inner_size([1280.0, 800.0]),
        renderer: eframe::Renderer::Wgpu,
        ..Default::default()
    };
    let _ = eframe::run_native(
        "Pointillist",
        native_options,
        Box::new(move |cc| Box::new(ui::create_app(cc, folder))),
    );
    Ok(())
}
