// ============================================================================
// CARD - one polaroid compositor instance
// ============================================================================
//
// A card owns its inputs (photo, LUT, optional frame), its clock, its light
// controller, its render surface and its backend. The host drives it:
//
//   PolaroidCard::load(config, source)  → PendingCard (background decode)
//   PendingCard::poll / wait            → PolaroidCard
//   card.tick()                         → once per display frame
//   card.pointer_* / card.resize        → input
//   card.unmount() / drop               → stop + release
//
// No state is shared between cards except the read-only GPU device.

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;

use crate::canvas::{RenderSurface, clamp_pixel_ratio, render_cpu};
use crate::error::CardError;
use crate::gpu::{GpuContext, GpuRenderer};
use crate::io::{ImageSource, PendingImage, resolve_lut, spawn_load};
use crate::ops::lut::HaldLut;
use crate::ops::overlay::{PAPER_COLOR, compose_card, fit_frame};
use crate::ops::shading::ShadeParams;
use crate::params::{CardGeometry, EffectParameters};
use crate::{log_err, log_info, log_warn};

/// Seconds per frame of the fixed-step clock.
pub const FRAME_DT: f32 = 1.0 / 60.0;
/// Orbit phase advanced per second.
pub const ORBIT_SPEED: f32 = 0.5;
/// Initial light, and where it returns when the pointer leaves the card.
pub const REST_LIGHT: [f32; 2] = [0.55, 0.22];

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Everything needed to build a card.
#[derive(Clone)]
pub struct CardConfig {
    pub photo: PathBuf,
    pub frame: Option<PathBuf>,
    pub lut: Option<PathBuf>,
    pub hald_size: u32,
    pub effects: EffectParameters,
    pub geometry: CardGeometry,
    pub css_width: f32,
    pub pixel_ratio: f32,
    /// Upper bound for `pixel_ratio` (never above 2).
    pub max_pixel_ratio: f32,
    pub paper_color: [u8; 4],
    /// Shared device; `None` renders on the CPU.
    pub gpu: Option<Arc<GpuContext>>,
}

impl CardConfig {
    pub fn new(photo: impl Into<PathBuf>) -> Self {
        Self {
            photo: photo.into(),
            frame: None,
            lut: None,
            hald_size: 16,
            effects: EffectParameters::default(),
            geometry: CardGeometry::default(),
            css_width: 560.0,
            pixel_ratio: 1.0,
            max_pixel_ratio: crate::canvas::MAX_PIXEL_RATIO,
            paper_color: PAPER_COLOR,
            gpu: None,
        }
    }

    fn effective_pixel_ratio(&self, ratio: f32) -> f32 {
        clamp_pixel_ratio(ratio).min(clamp_pixel_ratio(self.max_pixel_ratio))
    }
}

// ============================================================================
// LIGHT CONTROLLER
// ============================================================================

/// Idle orbit vs. pointer-held light, as a boolean latch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightController {
    light: [f32; 2],
    latched: bool,
}

impl Default for LightController {
    fn default() -> Self {
        Self {
            light: REST_LIGHT,
            latched: false,
        }
    }
}

impl LightController {
    /// Light position on the idle orbit at phase `orbit`.
    pub fn orbit_position(orbit: f32) -> [f32; 2] {
        [0.5 + 0.18 * orbit.cos(), 0.22 + 0.10 * (1.3 * orbit).sin()]
    }

    pub fn light(&self) -> [f32; 2] {
        self.light
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Per-frame update; the orbit only drives the light while unlatched.
    pub fn advance(&mut self, orbit: f32) {
        if !self.latched {
            self.light = Self::orbit_position(orbit);
        }
    }

    pub fn pointer_down(&mut self) {
        self.latched = true;
    }

    pub fn pointer_up(&mut self) {
        self.latched = false;
    }

    /// Card-local position, clamped to the card.
    pub fn pointer_move(&mut self, x: f32, y: f32) {
        let c = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.5 };
        self.light = [c(x), c(y)];
    }

    pub fn pointer_leave(&mut self) {
        self.light = REST_LIGHT;
    }

    /// Pin the light (still frames).
    pub fn set(&mut self, light: [f32; 2]) {
        self.pointer_move(light[0], light[1]);
    }
}

/// Seconds and orbit phase, advanced once per frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameClock {
    pub time: f32,
    pub orbit: f32,
}

impl FrameClock {
    pub fn advance(&mut self) {
        self.time += FRAME_DT;
        self.orbit += ORBIT_SPEED * FRAME_DT;
    }
}

// ============================================================================
// BACKEND
// ============================================================================

enum Backend {
    Cpu,
    Gpu(Box<GpuRenderer>),
}

impl Backend {
    fn build(gpu: Option<&Arc<GpuContext>>, photo: &RgbaImage, lut: &HaldLut) -> Result<Self, CardError> {
        let Some(ctx) = gpu else {
            return Ok(Backend::Cpu);
        };
        if !ctx.supports_size(photo.width(), photo.height()) {
            log_warn!(
                "[GPU] Photo {}×{} exceeds texture limit {}, rendering on CPU",
                photo.width(),
                photo.height(),
                ctx.max_texture_dim
            );
            return Ok(Backend::Cpu);
        }
        let renderer = GpuRenderer::new(Arc::clone(ctx), photo, lut.texture())?;
        log_info!("[GPU] Card renders on {}", renderer.adapter_name());
        Ok(Backend::Gpu(Box::new(renderer)))
    }

    fn name(&self) -> &'static str {
        match self {
            Backend::Cpu => "cpu",
            Backend::Gpu(_) => "gpu",
        }
    }
}

// ============================================================================
// CARD
// ============================================================================

/// Resources that exist only while the card is mounted.
struct Mounted {
    photo: Arc<RgbaImage>,
    lut: HaldLut,
    frame: Option<RgbaImage>,
    /// Frame scaled to the surface, tagged with the surface generation.
    fitted_frame: Option<(u64, RgbaImage)>,
    backend: Backend,
}

pub struct PolaroidCard {
    mounted: Option<Mounted>,
    effects: EffectParameters,
    geometry: CardGeometry,
    paper_color: [u8; 4],
    max_pixel_ratio: f32,
    clock: FrameClock,
    light: LightController,
    surface: RenderSurface,
    frames_rendered: u64,
}

impl PolaroidCard {
    /// Start loading the card's inputs in the background.
    pub fn load(config: CardConfig, source: Arc<dyn ImageSource>) -> PendingCard {
        let photo = spawn_load(Arc::clone(&source), config.photo.clone());
        let lut = config
            .lut
            .clone()
            .map(|p| spawn_load(Arc::clone(&source), p));
        let frame = config
            .frame
            .clone()
            .map(|p| spawn_load(Arc::clone(&source), p));
        PendingCard {
            config: Some(config),
            photo,
            lut,
            frame,
        }
    }

    /// Build a card from already decoded inputs.
    pub fn from_parts(
        config: &CardConfig,
        photo: RgbaImage,
        lut: HaldLut,
        frame: Option<RgbaImage>,
    ) -> Result<Self, CardError> {
        config.geometry.inset().validate()?;
        if photo.width() == 0 || photo.height() == 0 {
            return Err(CardError::PhotoLoad {
                path: config.photo.clone(),
                reason: "photo has no pixels".to_string(),
            });
        }

        let backend = Backend::build(config.gpu.as_ref(), &photo, &lut)?;
        let ratio = config.effective_pixel_ratio(config.pixel_ratio);
        let css_height = config.geometry.css_height(config.css_width);
        let surface = RenderSurface::new(config.css_width, css_height, ratio, 0);

        log_info!(
            "Card ready: photo {}×{}, LUT size {}, surface {}×{}, backend {}",
            photo.width(),
            photo.height(),
            lut.size(),
            surface.width(),
            surface.height(),
            backend.name()
        );

        Ok(Self {
            mounted: Some(Mounted {
                photo: Arc::new(photo),
                lut,
                frame,
                fitted_frame: None,
                backend,
            }),
            effects: config.effects,
            geometry: config.geometry,
            paper_color: config.paper_color,
            max_pixel_ratio: config.max_pixel_ratio,
            clock: FrameClock::default(),
            light: LightController::default(),
            surface,
            frames_rendered: 0,
        })
    }

    // ---- frame loop -------------------------------------------------------

    /// Advance the clock one frame, update the light and render once.
    /// Returns `false` (and does nothing) once unmounted.
    pub fn tick(&mut self) -> bool {
        if self.mounted.is_none() {
            return false;
        }
        self.clock.advance();
        self.light.advance(self.clock.orbit);
        self.render()
    }

    /// Render once at an explicit time with the light pinned at `light`,
    /// without advancing the clock.
    pub fn render_still(&mut self, time: f32, light: [f32; 2]) -> bool {
        if self.mounted.is_none() {
            return false;
        }
        self.clock.time = time;
        self.light.set(light);
        self.render()
    }

    /// Parameters of the next render pass.
    pub fn shade_params(&self) -> ShadeParams {
        ShadeParams {
            effects: self.effects,
            light_pos: self.light.light(),
            inset: self.geometry.inset(),
            hald_size: self
                .mounted
                .as_ref()
                .map(|m| m.lut.size() as f32)
                .unwrap_or(0.0),
            time: self.clock.time,
        }
    }

    fn render(&mut self) -> bool {
        let params = self.shade_params();
        let Some(m) = self.mounted.as_mut() else {
            return false;
        };

        let mut fallback = false;
        match &mut m.backend {
            Backend::Gpu(gpu) => {
                if let Err(e) = gpu.render(&params, &mut self.surface.pixels) {
                    log_err!("[GPU] Render failed ({}), switching to CPU", e);
                    fallback = true;
                }
            }
            Backend::Cpu => render_cpu(&m.photo, m.lut.texture(), &params, &mut self.surface.pixels),
        }
        if fallback {
            m.backend = Backend::Cpu;
            render_cpu(&m.photo, m.lut.texture(), &params, &mut self.surface.pixels);
        }

        if let Some(frame) = &m.frame {
            let generation = self.surface.generation;
            let stale = !matches!(&m.fitted_frame, Some((g, _)) if *g == generation);
            if stale {
                let fitted = fit_frame(frame, self.surface.width(), self.surface.height());
                m.fitted_frame = Some((generation, fitted));
            }
        }

        self.frames_rendered += 1;
        true
    }

    // ---- input ------------------------------------------------------------

    pub fn pointer_down(&mut self) {
        self.light.pointer_down();
    }

    pub fn pointer_up(&mut self) {
        self.light.pointer_up();
    }

    /// `x`, `y` are card-local fractions (0,0 top-left).
    pub fn pointer_move(&mut self, x: f32, y: f32) {
        self.light.pointer_move(x, y);
    }

    pub fn pointer_leave(&mut self) {
        self.light.pointer_leave();
    }

    /// Recreate the surface for a new display size. Returns `true` when a
    /// new surface was made. Takes effect on the next frame.
    pub fn resize(&mut self, css_width: f32, pixel_ratio: f32) -> bool {
        if self.mounted.is_none() {
            return false;
        }
        let ratio = clamp_pixel_ratio(pixel_ratio).min(clamp_pixel_ratio(self.max_pixel_ratio));
        let css_height = self.geometry.css_height(css_width);
        if !self.surface.needs_recreate(css_width, css_height, ratio) {
            self.surface.css_width = css_width;
            self.surface.css_height = css_height;
            return false;
        }
        let generation = self.surface.generation + 1;
        self.surface = RenderSurface::new(css_width, css_height, ratio, generation);
        log_info!(
            "Card surface recreated at {}×{} (generation {})",
            self.surface.width(),
            self.surface.height(),
            generation
        );
        true
    }

    // ---- output -----------------------------------------------------------

    /// Raw shader output (transparent outside the photo window).
    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    /// The finished card: frame over the surface, or the surface on paper.
    pub fn composed(&self) -> RgbaImage {
        let frame = self.mounted.as_ref().and_then(|m| {
            m.fitted_frame
                .as_ref()
                .filter(|(g, _)| *g == self.surface.generation)
                .map(|(_, f)| f)
        });
        compose_card(&self.surface.pixels, frame, self.paper_color)
    }

    // ---- state ------------------------------------------------------------

    pub fn light(&self) -> [f32; 2] {
        self.light.light()
    }

    pub fn is_latched(&self) -> bool {
        self.light.is_latched()
    }

    pub fn clock(&self) -> FrameClock {
        self.clock
    }

    pub fn effects(&self) -> &EffectParameters {
        &self.effects
    }

    /// Live parameter changes take effect on the next frame.
    pub fn effects_mut(&mut self) -> &mut EffectParameters {
        &mut self.effects
    }

    pub fn geometry(&self) -> CardGeometry {
        self.geometry
    }

    pub fn lut(&self) -> Option<&HaldLut> {
        self.mounted.as_ref().map(|m| &m.lut)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    pub fn backend_name(&self) -> &'static str {
        self.mounted
            .as_ref()
            .map(|m| m.backend.name())
            .unwrap_or("none")
    }

    /// Stop the frame loop and release every resource the card owns.
    pub fn unmount(&mut self) {
        let Some(mut m) = self.mounted.take() else {
            return;
        };
        if let Backend::Gpu(gpu) = &mut m.backend {
            gpu.release();
        }
        log_info!("Card unmounted after {} frames", self.frames_rendered);
    }
}

impl Drop for PolaroidCard {
    fn drop(&mut self) {
        self.unmount();
    }
}

// ============================================================================
// PENDING CARD
// ============================================================================

/// A card whose inputs are still decoding on the rayon pool.
pub struct PendingCard {
    config: Option<CardConfig>,
    photo: PendingImage,
    lut: Option<PendingImage>,
    frame: Option<PendingImage>,
}

impl PendingCard {
    fn all_done(&mut self) -> bool {
        let photo = self.photo.poll();
        let lut = self.lut.as_mut().is_none_or(|p| p.poll());
        let frame = self.frame.as_mut().is_none_or(|p| p.poll());
        photo && lut && frame
    }

    /// Non-blocking: `None` while loading, then the card (or its error)
    /// exactly once.
    pub fn poll(&mut self) -> Option<Result<PolaroidCard, CardError>> {
        if self.config.is_none() || !self.all_done() {
            return None;
        }
        Some(self.finish())
    }

    /// Block until every input has resolved.
    pub fn wait(mut self) -> Result<PolaroidCard, CardError> {
        self.photo.wait();
        if let Some(p) = self.lut.as_mut() {
            p.wait();
        }
        if let Some(p) = self.frame.as_mut() {
            p.wait();
        }
        self.finish()
    }

    fn finish(&mut self) -> Result<PolaroidCard, CardError> {
        let Some(config) = self.config.take() else {
            return Err(CardError::PhotoLoad {
                path: self.photo.path.clone(),
                reason: "card already delivered".to_string(),
            });
        };

        let photo = match self.photo.take() {
            Some(Ok(img)) => img,
            Some(Err(reason)) => {
                log_err!("Failed to load photo {}: {}", config.photo.display(), reason);
                return Err(CardError::PhotoLoad {
                    path: config.photo.clone(),
                    reason,
                });
            }
            None => {
                return Err(CardError::PhotoLoad {
                    path: config.photo.clone(),
                    reason: "load did not complete".to_string(),
                });
            }
        };

        let lut = match self.lut.as_mut() {
            None => HaldLut::neutral(),
            Some(pending) => {
                let loaded = pending.take();
                resolve_lut(&pending.path, loaded, config.hald_size)
            }
        };

        let frame = match self.frame.as_mut() {
            None => None,
            Some(pending) => match pending.take() {
                Some(Ok(img)) => Some(img),
                Some(Err(reason)) => {
                    log_warn!(
                        "Failed to load frame {}: {}; using paper border",
                        pending.path.display(),
                        reason
                    );
                    None
                }
                None => None,
            },
        };

        PolaroidCard::from_parts(&config, photo, lut, frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::lut::desaturate_hald;
    use crate::params::Inset;
    use image::Rgba;
    use std::path::Path;

    struct MapSource(Vec<(PathBuf, RgbaImage)>);

    impl ImageSource for MapSource {
        fn load(&self, path: &Path) -> Result<RgbaImage, String> {
            self.0
                .iter()
                .find(|(p, _)| p == path)
                .map(|(_, img)| img.clone())
                .ok_or_else(|| format!("not found: {}", path.display()))
        }
    }

    fn source() -> Arc<dyn ImageSource> {
        Arc::new(MapSource(vec![
            (
                PathBuf::from("photo.png"),
                RgbaImage::from_pixel(32, 32, Rgba([255, 0, 0, 255])),
            ),
            (PathBuf::from("grey.png"), desaturate_hald(16)),
            (PathBuf::from("small.png"), desaturate_hald(8)),
            (
                PathBuf::from("frame.png"),
                RgbaImage::from_pixel(10, 10, Rgba([0, 0, 255, 255])),
            ),
        ]))
    }

    fn small_config() -> CardConfig {
        let mut c = CardConfig::new("photo.png");
        c.css_width = 80.0;
        c
    }

    fn card(config: CardConfig) -> PolaroidCard {
        PolaroidCard::load(config, source()).wait().unwrap()
    }

    #[test]
    fn pointer_latch_holds_light_until_release() {
        let mut c = card(small_config());
        c.tick();
        c.pointer_down();
        c.pointer_move(0.2, 0.8);
        for _ in 0..10 {
            assert!(c.tick());
            assert_eq!(c.light(), [0.2, 0.8]);
        }
        c.pointer_up();
        c.tick();
        assert_eq!(c.light(), LightController::orbit_position(c.clock().orbit));
    }

    #[test]
    fn idle_orbit_follows_clock() {
        let mut c = card(small_config());
        assert_eq!(c.light(), REST_LIGHT);
        for _ in 0..30 {
            c.tick();
        }
        let clock = c.clock();
        assert!((clock.time - 0.5).abs() < 1e-4);
        assert!((clock.orbit - 0.25).abs() < 1e-4);
        assert_eq!(c.light(), LightController::orbit_position(clock.orbit));
    }

    #[test]
    fn pointer_is_clamped_and_leave_resets() {
        let mut ctl = LightController::default();
        ctl.pointer_move(-0.5, 1.7);
        assert_eq!(ctl.light(), [0.0, 1.0]);
        ctl.pointer_leave();
        assert_eq!(ctl.light(), REST_LIGHT);
    }

    #[test]
    fn missing_photo_is_fatal() {
        let pending = PolaroidCard::load(CardConfig::new("nope.png"), source());
        match pending.wait() {
            Err(CardError::PhotoLoad { path, .. }) => assert_eq!(path, PathBuf::from("nope.png")),
            _ => panic!("expected a photo load error"),
        }
    }

    #[test]
    fn missing_or_mis_sized_lut_renders_ungraded() {
        let mut cfg = small_config();
        cfg.lut = Some(PathBuf::from("missing.png"));
        let c = card(cfg.clone());
        assert!(c.lut().unwrap().is_neutral());

        cfg.lut = Some(PathBuf::from("small.png"));
        let c = card(cfg.clone());
        assert!(c.lut().unwrap().is_neutral());

        cfg.lut = Some(PathBuf::from("grey.png"));
        let c = card(cfg);
        assert_eq!(c.lut().unwrap().size(), 16);
    }

    #[test]
    fn unmount_stops_rendering() {
        let mut c = card(small_config());
        assert!(c.tick());
        c.unmount();
        assert!(!c.is_mounted());
        let before = c.frames_rendered();
        assert!(!c.tick());
        assert!(!c.render_still(1.0, [0.5, 0.5]));
        assert_eq!(c.frames_rendered(), before);
        c.unmount();
    }

    #[test]
    fn resize_recreates_surface() {
        let mut c = card(small_config());
        let g0 = c.surface().generation;
        assert_eq!((c.surface().width(), c.surface().height()), (80, 97));
        assert!(!c.resize(80.0, 1.0));
        assert!(c.resize(80.0, 2.0));
        assert_eq!(c.surface().generation, g0 + 1);
        assert_eq!((c.surface().width(), c.surface().height()), (160, 194));
        assert!(!c.resize(80.0, 4.0));
        c.tick();
        assert_eq!(c.composed().dimensions(), (160, 194));
    }

    #[test]
    fn frame_is_fitted_and_laid_over() {
        let mut cfg = small_config();
        cfg.frame = Some(PathBuf::from("frame.png"));
        let mut c = card(cfg);
        c.tick();
        let out = c.composed();
        assert_eq!(out.dimensions(), (80, 97));
        assert_eq!(out.get_pixel(40, 40).0, [0, 0, 255, 255]);
    }

    #[test]
    fn paper_fills_border_without_frame() {
        let mut c = card(small_config());
        c.tick();
        let out = c.composed();
        assert_eq!(out.get_pixel(0, 0).0, PAPER_COLOR);
        assert_eq!(c.surface().pixels.get_pixel(0, 0).0[3], 0);
        assert_eq!(out.get_pixel(40, 40).0[3], 255);
    }

    #[test]
    fn degenerate_inset_is_rejected() {
        let mut cfg = small_config();
        cfg.geometry = CardGeometry::Custom {
            inset: Inset::new(0.6, 0.0, 0.5, 0.0),
            aspect: 1.0,
        };
        assert!(matches!(
            PolaroidCard::load(cfg, source()).wait(),
            Err(CardError::InvalidInset(_))
        ));
    }

    #[test]
    fn poll_delivers_card_once() {
        let mut pending = PolaroidCard::load(small_config(), source());
        let mut got = None;
        for _ in 0..10_000 {
            if let Some(r) = pending.poll() {
                got = Some(r);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert!(got.unwrap().is_ok());
        assert!(pending.poll().is_none());
    }
}
