use eframe::egui;

pub const PLATINUM_BG: egui::Color32 = egui::Color32::from_rgb(212, 208, 200);
pub const PLATINUM_DARK: egui::Color32 = egui::Color32::from_rgb(128, 128, 128);
pub const METER_FILL: egui::Color32 = egui::Color32::from_rgb(0, 128, 0);
const TITLE_FILL: egui::Color32 = egui::Color32::from_rgb(222, 222, 222);
const SELECTION_FILL: egui::Color32 = egui::Color32::from_rgb(51, 51, 153);

/// Light grey, square-cornered look applied to every panel and widget.
pub fn setup_global_style(ctx: &egui::Context) {
    ctx.style_mut(|style| {
        let visuals = &mut style.visuals;
        visuals.dark_mode = false;
        visuals.panel_fill = PLATINUM_BG;
        visuals.window_fill = PLATINUM_BG;
        visuals.extreme_bg_color = egui::Color32::WHITE;
        visuals.override_text_color = Some(egui::Color32::BLACK);
        visuals.selection.bg_fill = SELECTION_FILL;
        visuals.selection.stroke = egui::Stroke::new(1.0, egui::Color32::WHITE);

        for widget in [
            &mut visuals.widgets.noninteractive,
            &mut visuals.widgets.inactive,
            &mut visuals.widgets.hovered,
            &mut visuals.widgets.active,
            &mut visuals.widgets.open,
        ] {
            widget.rounding = egui::Rounding::ZERO;
            widget.expansion = 0.0;
        }
        visuals.widgets.inactive.bg_stroke = egui::Stroke::new(1.0, PLATINUM_DARK);

        style.spacing.item_spacing = egui::vec2(6.0, 4.0);
        style.spacing.button_padding = egui::vec2(8.0, 2.0);
    });
}

/// Draws the menu bar with the active mode and transform.
pub fn draw_menu_bar(ui: &mut egui::Ui, transform_name: &str, mode: &str) {
    egui::TopBottomPanel::top("menubar").show_inside(ui, |ui| {
        ui.visuals_mut().widgets.noninteractive.bg_fill = PLATINUM_BG;
        ui.horizontal(|ui| {
            //
            // Application title and current mode.
            //
            ui.label(egui::RichText::new("sonoscope").strong());
            ui.separator();
            ui.label(mode);

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                //
                // Transform information label.
                //
                ui.label(egui::RichText::new(transform_name).italics().size(10.0));
            });
        });
    });
}

/// Draws the one-line status bar at the bottom of the window.
pub fn draw_status_line(ui: &mut egui::Ui, status: &str) {
    egui::TopBottomPanel::bottom("statusline").show_inside(ui, |ui| {
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new(status).size(11.0).color(egui::Color32::BLACK));
        });
    });
}

/// Horizontal bar showing a level in [0, 1].
pub fn draw_level_meter(ui: &mut egui::Ui, label: &str, level: f32) {
    ui.horizontal(|ui| {
        ui.label(label);
        let (rect, _response) =
            ui.allocate_exact_size(egui::vec2(160.0, 12.0), egui::Sense::hover());

        //
        // Sunken trough with the filled portion on top.
        //
        ui.painter().rect_filled(rect, 0.0, egui::Color32::WHITE);
        let mut filled = rect;
        filled.set_width(rect.width() * level.clamp(0.0, 1.0));
        ui.painter().rect_filled(filled, 0.0, METER_FILL);
        ui.painter().rect_stroke(
            rect,
            egui::Rounding::ZERO,
            egui::Stroke::new(1.0, PLATINUM_DARK),
        );
    });
}

/// Titled, bordered group holding one section of the window.
pub fn draw_platinum_window<F>(ui: &mut egui::Ui, title: &str, content: F)
where
    F: FnOnce(&mut egui::Ui),
{
    egui::Frame::none()
        .fill(PLATINUM_BG)
        .stroke(egui::Stroke::new(1.0, egui::Color32::BLACK))
        .inner_margin(egui::Margin::same(3.0))
        .show(ui, |ui| {
            draw_title_bar(ui, title);
            ui.add_space(3.0);

            egui::Frame::none()
                .stroke(egui::Stroke::new(1.0, PLATINUM_DARK))
                .inner_margin(egui::Margin::symmetric(8.0, 6.0))
                .show(ui, content);
        });
}

/// Striped caption strip with the title on a plain plate in the middle.
fn draw_title_bar(ui: &mut egui::Ui, title: &str) {
    const HEIGHT: f32 = 16.0;

    let (rect, _) =
        ui.allocate_exact_size(egui::vec2(ui.available_width(), HEIGHT), egui::Sense::hover());
    let painter = ui.painter_at(rect);

    painter.rect_filled(rect, 0.0, TITLE_FILL);
    let stripe = egui::Stroke::new(1.0, PLATINUM_DARK);
    let mut y = rect.min.y + 3.0;
    while y < rect.max.y - 2.0 {
        painter.hline(rect.min.x + 2.0..=rect.max.x - 2.0, y, stripe);
        y += 2.0;
    }

    let font = egui::FontId::proportional(12.0);
    let galley = painter.layout_no_wrap(title.to_string(), font, egui::Color32::BLACK);
    let plate = egui::Rect::from_center_size(
        rect.center(),
        galley.size() + egui::vec2(12.0, 0.0),
    );
    painter.rect_filled(plate, 0.0, TITLE_FILL);
    painter.galley(
        plate.center() - galley.size() / 2.0,
        galley,
        egui::Color32::BLACK,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_style_is_square_and_light() {
        let ctx = egui::Context::default();
        setup_global_style(&ctx);

        let style = ctx.style();
        assert!(!style.visuals.dark_mode);
        assert_eq!(style.visuals.panel_fill, PLATINUM_BG);
        assert_eq!(style.visuals.selection.bg_fill, SELECTION_FILL);
        assert_eq!(style.visuals.widgets.hovered.rounding, egui::Rounding::ZERO);
        assert_eq!(style.visuals.widgets.open.expansion, 0.0);
    }
}
