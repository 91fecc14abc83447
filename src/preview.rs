// ============================================================================
// PREVIEW - eframe window hosting one live card
// ============================================================================
//
// The window's repaint loop is the card's frame loop: every `update` ticks
// the card once, uploads the composed card and asks for the next repaint.
// Closing the window drops the app, which unmounts the card.

use std::process::ExitCode;
use std::sync::Arc;

use eframe::egui;

use crate::card::{PendingCard, PolaroidCard};
use crate::cli::{CliArgs, build_config, load_settings, open_gpu, resolve_inputs};
use crate::io::{FileSource, ImageSource};
use crate::settings::RenderSettings;
use crate::{log_err, log_info};

const SIDE_PANEL_WIDTH: f32 = 220.0;

pub struct PreviewApp {
    pending: Option<PendingCard>,
    card: Option<PolaroidCard>,
    error: Option<String>,
    texture: Option<egui::TextureHandle>,
    css_width: f32,
    pixels_per_point: f32,
    hovering: bool,
    settings: RenderSettings,
}

impl PreviewApp {
    pub fn new(pending: PendingCard, css_width: f32, settings: RenderSettings) -> Self {
        Self {
            pending: Some(pending),
            card: None,
            error: None,
            texture: None,
            css_width,
            pixels_per_point: 0.0,
            hovering: false,
            settings,
        }
    }

    fn poll_pending(&mut self) {
        let Some(pending) = self.pending.as_mut() else { return };
        match pending.poll() {
            None => {}
            Some(Ok(card)) => {
                self.card = Some(card);
                self.pending = None;
            }
            Some(Err(e)) => {
                log_err!("{}", e);
                self.error = Some(e.to_string());
                self.pending = None;
            }
        }
    }

    fn upload(&mut self, ctx: &egui::Context) {
        let Some(card) = &self.card else { return };
        let img = card.composed();
        let size = [img.width() as usize, img.height() as usize];
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, img.as_raw());
        match &mut self.texture {
            Some(tex) => tex.set(color_image, egui::TextureOptions::LINEAR),
            None => {
                self.texture =
                    Some(ctx.load_texture("polaroid_card", color_image, egui::TextureOptions::LINEAR));
            }
        }
    }

    fn effect_sliders(ui: &mut egui::Ui, card: &mut PolaroidCard) {
        let e = card.effects_mut();
        ui.add(egui::Slider::new(&mut e.lut_strength, 0.0..=1.0).text("LUT"));
        ui.add(egui::Slider::new(&mut e.vignette, 0.0..=1.0).text("Vignette"));
        ui.add(egui::Slider::new(&mut e.grain, 0.0..=1.0).text("Grain"));
        ui.separator();
        ui.add(egui::Slider::new(&mut e.gloss, 0.0..=1.0).text("Gloss"));
        ui.add(egui::Slider::new(&mut e.spec_power, 20.0..=120.0).text("Spec power"));
        ui.add(egui::Slider::new(&mut e.fresnel, 0.0..=1.5).text("Fresnel"));
        ui.add(egui::Slider::new(&mut e.roll, 0.0..=0.9).text("Roll"));
        ui.add(egui::Slider::new(&mut e.streak, 0.0..=1.0).text("Streak"));
    }
}

impl eframe::App for PreviewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_pending();

        if let Some(card) = self.card.as_mut() {
            let settings = &mut self.settings;
            egui::SidePanel::right("effects")
                .exact_width(SIDE_PANEL_WIDTH)
                .show(ctx, |ui| {
                    ui.heading("Effects");
                    Self::effect_sliders(ui, card);
                    ui.separator();
                    ui.label(format!("Backend: {}", card.backend_name()));
                    let light = card.light();
                    ui.label(format!("Light: {:.2}, {:.2}", light[0], light[1]));
                    if card.is_latched() {
                        ui.label("Light held");
                    }
                    ui.separator();
                    if ui.button("Save as defaults").clicked() {
                        settings.effects = *card.effects();
                        settings.save();
                        log_info!("Effect defaults saved");
                    }
                });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(err) = &self.error {
                ui.colored_label(egui::Color32::RED, err);
                return;
            }
            let Some(card) = self.card.as_mut() else {
                ui.centered_and_justified(|ui| ui.spinner());
                ctx.request_repaint();
                return;
            };

            // Window scale changes resize the surface.
            let ppp = ctx.pixels_per_point();
            if ppp != self.pixels_per_point {
                self.pixels_per_point = ppp;
                card.resize(self.css_width, ppp);
            }

            // Pointer latch: press / release anywhere in the window.
            let (pressed, released) =
                ctx.input(|i| (i.pointer.primary_pressed(), i.pointer.primary_released()));
            if pressed {
                card.pointer_down();
            }
            if released {
                card.pointer_up();
            }

            let css_height = card.geometry().css_height(self.css_width);
            let (rect, response) = ui.allocate_exact_size(
                egui::vec2(self.css_width, css_height),
                egui::Sense::hover(),
            );

            match response.hover_pos() {
                Some(pos) => {
                    let x = (pos.x - rect.min.x) / rect.width();
                    let y = (pos.y - rect.min.y) / rect.height();
                    card.pointer_move(x, y);
                    self.hovering = true;
                }
                None => {
                    if self.hovering {
                        card.pointer_leave();
                        self.hovering = false;
                    }
                }
            }

            card.tick();
            self.upload(ctx);

            if let Some(tex) = &self.texture {
                ui.painter().image(
                    tex.id(),
                    rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
            }
        });

        ctx.request_repaint();
    }
}

/// Open the preview for the first input and block until the window closes.
pub fn run(args: CliArgs) -> ExitCode {
    let settings = match load_settings(&args) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(photo) = resolve_inputs(&args.input).into_iter().next() else {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    };

    let mut config = match build_config(&args, &settings, &photo) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    config.gpu = open_gpu(&args, &settings);

    let css_width = config.css_width;
    let css_height = config.geometry.css_height(css_width);
    let source: Arc<dyn ImageSource> = Arc::new(FileSource);
    let pending = PolaroidCard::load(config, source);
    log_info!("Preview opened for {}", photo.display());

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([css_width + SIDE_PANEL_WIDTH + 40.0, css_height + 40.0])
            .with_title(format!("PolaroidFX - {}", photo.display())),
        ..Default::default()
    };

    let result = eframe::run_native(
        "PolaroidFX",
        options,
        Box::new(move |_cc| Box::new(PreviewApp::new(pending, css_width, settings))),
    );

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_err!("Preview window failed: {}", e);
            eprintln!("error: preview window failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
