use sonoscope::config::Config;
use sonoscope::fft::find_transform;
use sonoscope::gui::{self, AnalyzerApp};

fn main() -> Result<(), eframe::Error> {
    //
    // Initialize logging with default filter set to "info".
    //
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting sonoscope...");

    //
    // Load configuration; invalid values fall back to the defaults.
    //
    let config = Config::from_env();
    let config = match config.validate() {
        Ok(()) => config,
        Err(e) => {
            log::error!("{}; using defaults", e);
            Config::default()
        }
    };

    //
    // Initialize FFT plan. Sources share it through the plan cache.
    //
    log::info!("Initializing FFT plan for N={}", config.analysis.fft_size);
    let transform = find_transform(config.analysis.fft_size);

    //
    // Initialize GUI configuration. Audio devices are opened on first use.
    //
    log::info!("Initializing GUI...");
    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([1024.0, 720.0])
            .with_min_inner_size([800.0, 600.0])
            .with_title("sonoscope"),
        ..Default::default()
    };

    //
    // Launch GUI application.
    //
    eframe::run_native(
        "sonoscope",
        options,
        Box::new(move |cc| {
            gui::theme::setup_global_style(&cc.egui_ctx);

            //
            // Construct and return the analyzer application instance.
            //
            Ok(Box::new(AnalyzerApp::new(cc, config, transform)))
        }),
    )
}
