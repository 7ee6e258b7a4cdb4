mod app;
mod config;
mod coords;
mod drag;
mod export;
mod ink;
mod model;

use std::path::PathBuf;

fn main() {
    env_logger::init();

    // Optional base image on the command line; everything else is picked
    // through file dialogs.
    let args: Vec<String> = std::env::args().collect();
    let image_path = args.get(1).map(PathBuf::from);
    if let Some(ref path) = image_path {
        if !path.exists() {
            eprintln!("File not found: {}", path.display());
            std::process::exit(1);
        }
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_title("meme-edit"),
        ..Default::default()
    };

    eframe::run_native(
        "meme-edit",
        options,
        Box::new(move |_cc| Ok(Box::new(app::MemeApp::new(image_path)))),
    )
    .expect("Failed to run eframe");
}
