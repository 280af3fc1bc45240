pub mod theme;

use eframe::egui;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::calibration::SweepProgress;
use crate::colormap::Palette;
use crate::config::Config;
use crate::fft::{SpectralFrame, Transform};
use crate::library::{scan_folder, TrackHandle};
use crate::render::Raster;
use crate::scheduler::{RefreshTicks, Scheduler, Tick};
use crate::session::Session;
use crate::snapshot::{unix_millis, DirectorySaveTarget, SnapshotOutcome};
use crate::source::AnalysisSource;

pub struct AnalyzerApp {
    session: Session,
    transform: Arc<dyn Transform>,

    //
    // Texture handles for the session's surfaces.
    //
    waterfall_texture: Option<egui::TextureHandle>,
    spectrogram_texture: Option<egui::TextureHandle>,
    latest: Option<SpectralFrame>,

    scheduler: Scheduler<RefreshTicks>,
    snapshot_target: DirectorySaveTarget,

    //
    // Library panel state.
    //
    folder: String,
    tracks: Vec<TrackHandle>,
    status: String,

    //
    // Statistics and diagnostic information.
    //
    last_stats_time: Instant,
    frames_pulled: usize,
}

impl AnalyzerApp {
    pub fn new(_cc: &eframe::CreationContext, config: Config, transform: Arc<dyn Transform>) -> Self {
        let folder = config
            .library_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        let mut app = Self {
            transform,
            waterfall_texture: None,
            spectrogram_texture: None,
            latest: None,
            scheduler: Scheduler::new(RefreshTicks::new()),
            snapshot_target: DirectorySaveTarget::new(config.snapshot_dir.clone()),
            folder,
            tracks: Vec::new(),
            status: "Pick a track or start the microphone".to_string(),
            last_stats_time: Instant::now(),
            frames_pulled: 0,
            session: Session::new(config),
        };

        if !app.folder.is_empty() {
            app.scan();
        }
        app
    }

    fn scan(&mut self) {
        let dir = PathBuf::from(self.folder.trim());
        match scan_folder(&dir) {
            Ok(tracks) => {
                self.status = format!("{} track(s) in {}", tracks.len(), dir.display());
                self.tracks = tracks;
            }
            Err(e) => {
                log::warn!("Failed to scan {}: {}", dir.display(), e);
                self.status = format!("Cannot read {}: {}", dir.display(), e);
            }
        }
    }

    /// Status text for an action, preferring a missing output device.
    fn report(&mut self, message: String) {
        self.status = match self.session.take_output_error() {
            Some(e) => format!("{} ({} - no audible output)", message, e),
            None => message,
        };
    }

    fn load_track(&mut self, track: &TrackHandle) {
        match self.session.load_track(track) {
            Ok(()) => {
                let message = match self.session.decoded() {
                    Some(decoded) => format!(
                        "Playing '{}' ({:.1}s @ {}Hz)",
                        decoded.name,
                        decoded.duration_secs(),
                        decoded.sample_rate
                    ),
                    None => format!("Playing '{}'", track.name),
                };
                self.report(message);
            }
            Err(e) => {
                log::error!("{}", e);
                self.report(e.to_string());
            }
        }
        self.spectrogram_texture = None;
        self.latest = None;
    }

    fn start_live(&mut self) {
        let message = match self.session.start_live() {
            Ok(()) => "Listening to the microphone".to_string(),
            Err(e) => e.to_string(),
        };
        self.report(message);
        self.spectrogram_texture = None;
        self.latest = None;
    }

    fn stop(&mut self) {
        self.session.stop();
        self.status = "Stopped".to_string();
    }

    fn set_palette(&mut self, palette: Palette) {
        self.session.set_palette(palette);
        self.spectrogram_texture = None;
    }

    fn start_calibration(&mut self) {
        if self.session.start_calibration(Instant::now()) {
            self.status = "Calibration sweep running".to_string();
        }
    }

    fn save_snapshot(&mut self) {
        match self
            .session
            .snapshot(&mut self.snapshot_target, unix_millis())
        {
            Ok(SnapshotOutcome::Saved(path)) => {
                self.status = format!("Saved {}", path.display());
            }
            Ok(SnapshotOutcome::NoSurfaceAttached) => {}
            Err(e) => {
                log::error!("{}", e);
                self.status = e.to_string();
            }
        }
    }

    fn step(&mut self, tick: Tick) {
        let report = self.session.step(tick);

        if let SweepProgress::Completed { final_target_hz } = report.sweep {
            self.status = format!("Calibration reached {:.0} Hz", final_target_hz);
        }
        if let Some(frame) = report.frame {
            self.frames_pulled += 1;
            self.latest = Some(frame);
        }
        if let Some(reason) = report.failure {
            self.status = format!("Microphone stopped: {}", reason);
        }

        //
        // Periodic statistics logging.
        //
        if tick.at.saturating_duration_since(self.last_stats_time) > Duration::from_secs(1) {
            let waterfall = self.session.waterfall();
            log::debug!(
                "Tick {} | Frames: {} | Columns: {} | Level: {:.1}",
                tick.seq,
                self.frames_pulled,
                waterfall.columns_drawn(),
                waterfall.signal_level()
            );
            self.frames_pulled = 0;
            self.last_stats_time = tick.at;
        }
    }

    fn mode_label(&self) -> String {
        match self.session.source() {
            AnalysisSource::Idle => "Idle".to_string(),
            AnalysisSource::File(file) => format!("File: {}", file.track_name()),
            AnalysisSource::Live(live) => format!("Live: {}", live.device_name()),
        }
    }

    fn draw_library(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Folder");
            ui.text_edit_singleline(&mut self.folder);
        });
        if ui.button("Scan").clicked() {
            self.scan();
        }
        ui.separator();

        let current = self.session.source().label().map(str::to_string);
        let mut picked = None;
        egui::ScrollArea::vertical().max_height(320.0).show(ui, |ui| {
            for track in &self.tracks {
                let selected = current.as_deref() == Some(track.name.as_str());
                let text = format!("{}  ({} KB)", track.name, track.byte_size / 1024);
                if ui
                    .selectable_label(selected, text)
                    .on_hover_text(track.mime_type.as_str())
                    .clicked()
                {
                    picked = Some(track.clone());
                }
            }
        });
        if let Some(track) = picked {
            self.load_track(&track);
        }

        ui.separator();
        ui.horizontal(|ui| {
            if ui.button("Microphone").clicked() {
                self.start_live();
            }
            if ui.button("Stop").clicked() {
                self.stop();
            }
        });
    }

    fn draw_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let current = self.session.palette();
            let mut palette = current;
            egui::ComboBox::from_label("Palette")
                .selected_text(palette.name())
                .show_ui(ui, |ui| {
                    for p in Palette::ALL {
                        ui.selectable_value(&mut palette, p, p.name());
                    }
                });
            if palette != current {
                self.set_palette(palette);
            }

            if ui.button("Snapshot").clicked() {
                self.save_snapshot();
            }
        });

        if let Some(file) = self.session.source_mut().as_file_mut() {
            //
            // Transport for the loaded track.
            //
            ui.horizontal(|ui| {
                let label = if file.is_playing() { "Pause" } else { "Play" };
                if ui.button(label).clicked() {
                    if file.is_playing() {
                        file.pause();
                    } else {
                        file.play();
                    }
                }

                let duration = file.duration_secs();
                let mut position = file.position_secs();
                if ui
                    .add(egui::Slider::new(&mut position, 0.0..=duration).suffix(" s"))
                    .changed()
                {
                    file.seek(position);
                }
            });
        }

        let mut start_sweep = false;
        let mut cancel_sweep = false;
        let sweeping = self.session.calibration().is_running();
        if let Some(live) = self.session.source_mut().as_live_mut() {
            ui.horizontal(|ui| {
                let (min, max) = live.gain().range();
                let mut gain = live.gain().value();
                if ui
                    .add(egui::Slider::new(&mut gain, min..=max).text("Gain"))
                    .changed()
                {
                    live.set_gain(gain);
                }

                if sweeping {
                    cancel_sweep = ui.button("Cancel sweep").clicked();
                } else {
                    start_sweep = ui.button("Calibrate").clicked();
                }
            });
        }
        if start_sweep {
            self.start_calibration();
        }
        if cancel_sweep {
            self.session.cancel_calibration();
        }
    }

    fn draw_frequency_domain(&mut self, ui: &mut egui::Ui) {
        let width = ui.available_width();

        if let Some(spectrogram) = self.session.spectrogram() {
            ui.heading(format!("Spectrogram: {}", spectrogram.track_name));

            let texture = upload_texture(
                ui,
                &mut self.spectrogram_texture,
                "spectrogram",
                &spectrogram.raster,
                false,
            );
            let r = ui.image((texture, egui::vec2(width, 240.0)));

            //
            // Playhead over the column being played.
            //
            if let AnalysisSource::File(file) = self.session.source() {
                let column = spectrogram.column_at(file.position_secs()) as f32 + 0.5;
                let columns = spectrogram.raster.width().max(1) as f32;
                let x = r.rect.min.x + column / columns * r.rect.width();
                ui.painter().line_segment(
                    [
                        egui::Pos2::new(x, r.rect.min.y),
                        egui::Pos2::new(x, r.rect.max.y),
                    ],
                    egui::Stroke::new(1.0, egui::Color32::WHITE),
                );
            }

            ui.label(format!(
                "0 - {:.1} s | 0 - {:.0} Hz",
                spectrogram.duration_secs, spectrogram.max_frequency_hz
            ));
        } else {
            ui.heading("Waterfall");

            let waterfall = self.session.waterfall();
            let texture = upload_texture(
                ui,
                &mut self.waterfall_texture,
                "waterfall",
                waterfall.surface(),
                waterfall.is_attached(),
            );
            let r = ui.image((texture, egui::vec2(width, 240.0)));

            if self.session.source().is_idle() {
                ui.painter().text(
                    r.rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "NO SOURCE",
                    egui::FontId::proportional(20.0),
                    egui::Color32::RED,
                );
            }

            theme::draw_level_meter(ui, "Level", waterfall.signal_level() / 255.0);
        }

        let sweep = self.session.calibration().state();
        if sweep.active {
            ui.label(format!(
                "Calibration target: {:.0} Hz ({:.0} - {:.0} Hz)",
                sweep.current_target_frequency, sweep.sweep_start, sweep.sweep_end
            ));
        }

        ui.separator();
        ui.heading("Instantaneous");

        //
        // Draw instantaneous spectrum plot.
        //
        egui::Frame::canvas(ui.style()).show(ui, |ui| {
            let (_rect, response) = ui.allocate_exact_size(
                egui::vec2(ui.available_width(), 100.0),
                egui::Sense::hover(),
            );

            ui.painter().rect_stroke(
                response.rect,
                egui::Rounding::ZERO,
                egui::Stroke::new(1.0, egui::Color32::GRAY),
            );

            let Some(frame) = &self.latest else {
                return;
            };
            let bins = frame.bin_count().max(1);
            let points: Vec<egui::Pos2> = frame
                .magnitudes
                .iter()
                .enumerate()
                .map(|(i, &m)| {
                    let x = response.rect.min.x + (i as f32 / bins as f32) * response.rect.width();
                    let y = response.rect.max.y - (m as f32 / 255.0) * response.rect.height();
                    egui::Pos2::new(x, y)
                })
                .collect();

            ui.painter().add(egui::Shape::line(
                points,
                egui::Stroke::new(1.0, egui::Color32::DARK_BLUE),
            ));
        });
    }
}

/// Uploads `raster` into `slot` when it is missing or `refresh` is set.
fn upload_texture(
    ui: &egui::Ui,
    slot: &mut Option<egui::TextureHandle>,
    name: &str,
    raster: &Raster,
    refresh: bool,
) -> egui::TextureId {
    let image = || {
        egui::ColorImage::from_rgba_unmultiplied([raster.width(), raster.height()], raster.pixels())
    };

    match slot {
        Some(texture) => {
            if refresh {
                texture.set(image(), egui::TextureOptions::NEAREST);
            }
            texture.id()
        }
        None => {
            let texture = ui
                .ctx()
                .load_texture(name, image(), egui::TextureOptions::NEAREST);
            let id = texture.id();
            *slot = Some(texture);
            id
        }
    }
}

impl eframe::App for AnalyzerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        //
        // One tick per display refresh, then request the next repaint.
        //
        self.scheduler.ticks_mut().on_refresh(Instant::now());
        let mut due = Vec::new();
        self.scheduler.drive(|tick| due.push(tick));
        for tick in due {
            self.step(tick);
        }
        ctx.request_repaint();

        egui::CentralPanel::default().show(ctx, |ui| {
            //
            // Draw top menu bar and bottom status line.
            //
            let mode = self.mode_label();
            theme::draw_menu_bar(ui, &self.transform.name(), &mode);
            theme::draw_status_line(ui, &self.status);
            ui.add_space(4.0);

            egui::SidePanel::left("library")
                .resizable(false)
                .default_width(220.0)
                .show_inside(ui, |ui| {
                    theme::draw_platinum_window(ui, "Library", |ui| self.draw_library(ui));
                });

            theme::draw_platinum_window(ui, "Controls", |ui| self.draw_controls(ui));
            ui.add_space(4.0);
            theme::draw_platinum_window(ui, "Frequency Domain", |ui| {
                self.draw_frequency_domain(ui)
            });
        });
    }
}
