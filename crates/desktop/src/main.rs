//! OptiMonkey Desktop: application entry.

mod app;

use eframe::egui;

fn main() -> anyhow::Result<()> {
    // The backend connection and REST calls run here; the egui loop stays on the main thread.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([800.0, 600.0]),
        ..Default::default()
    };
    eframe::run_native(
        "OptiMonkey",
        options,
        Box::new(move |cc| Box::new(app::OptiMonkeyApp::new(cc, runtime))),
    )
    .map_err(|e| anyhow::anyhow!("desktop app failed: {}", e))
}
