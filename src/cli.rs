// ============================================================================
// PolaroidFX CLI - batch rendering of polaroid cards from the command line
// ============================================================================
//
// Usage examples:
//   PolaroidFX -i photo.jpg -o card.png
//   PolaroidFX -i shots/*.jpg --lut film.png --output-dir cards/ --format jpeg
//   PolaroidFX -i photo.jpg --frame border.png --light 0.3,0.2 --gloss 0.9 -o card.png
//   PolaroidFX -i photo.jpg --frames 120 --fps 30 -o orbit.gif
//   PolaroidFX -i photo.jpg --preview
//
// Each input becomes one card; stills render once, animations tick the
// idle orbit `--frames` times.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use image::RgbaImage;

use crate::card::{CardConfig, LightController, ORBIT_SPEED, PolaroidCard};
use crate::gpu::GpuContext;
use crate::io::{FileSource, ImageSource, SaveFormat, encode_and_write, encode_frames};
use crate::params::{CardGeometry, Inset, PolaroidMode};
use crate::settings::RenderSettings;
use crate::{log_info, log_warn};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// PolaroidFX card renderer.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "PolaroidFX",
    about = "Render photos as glossy instant-film cards",
    long_about = "Composite photos into polaroid-style cards: HALD LUT grading,\n\
                  vignette, film grain and a glossy laminate lit by a moving light.\n\
                  Writes PNG, JPEG, WEBP, BMP, TGA stills or GIF / APNG animations.\n\n\
                  Example:\n  \
                  PolaroidFX -i photo.jpg --lut film.png -o card.png\n  \
                  PolaroidFX -i *.jpg --output-dir cards/ --frames 90 --format gif"
)]
pub struct CliArgs {
    /// Input photo(s). Glob patterns accepted (e.g. "*.jpg", "shots/*.png").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// HALD LUT image used for colour grading.
    #[arg(long, value_name = "FILE")]
    pub lut: Option<PathBuf>,

    /// HALD grid size of --lut: 8 or 16.
    #[arg(long, value_name = "8|16")]
    pub hald_size: Option<u32>,

    /// Decorative frame image laid over the card.
    #[arg(long, value_name = "FILE")]
    pub frame: Option<PathBuf>,

    #[arg(long, value_name = "0-1")]
    pub lut_strength: Option<f32>,

    #[arg(long, value_name = "0-1")]
    pub gloss: Option<f32>,

    #[arg(long, value_name = "20-120")]
    pub spec_power: Option<f32>,

    #[arg(long, value_name = "0-1.5")]
    pub fresnel: Option<f32>,

    #[arg(long, value_name = "0-1")]
    pub streak: Option<f32>,

    #[arg(long, value_name = "0-0.9")]
    pub roll: Option<f32>,

    #[arg(long, value_name = "0-1")]
    pub grain: Option<f32>,

    #[arg(long, value_name = "0-1")]
    pub vignette: Option<f32>,

    /// Pin the light at card-local X,Y (0..1). Default: idle orbit at --time.
    #[arg(long, value_name = "X,Y")]
    pub light: Option<String>,

    /// Clock time in seconds for stills (drives grain and orbit).
    #[arg(long, default_value_t = 0.0, value_name = "SECONDS")]
    pub time: f32,

    /// Polaroid border split: classic, option-a.
    #[arg(long, value_name = "MODE")]
    pub mode: Option<String>,

    /// Custom photo window as fractions: top,right,bottom,left.
    #[arg(long, value_name = "T,R,B,L")]
    pub inset: Option<String>,

    /// Card width in CSS pixels.
    #[arg(long, value_name = "PX")]
    pub width: Option<f32>,

    /// Card height in CSS pixels (only with --inset).
    #[arg(long, value_name = "PX")]
    pub height: Option<f32>,

    /// Device pixel ratio (capped at 2).
    #[arg(long, default_value_t = 1.0, value_name = "R")]
    pub pixel_ratio: f32,

    /// Output file path for a single input. Batches go to --output-dir.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch rendering.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp, bmp, tga, gif, apng.
    /// When omitted, inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Write the bare shader surface (transparent border, no frame or paper).
    #[arg(long)]
    pub raw: bool,

    /// Number of idle-orbit frames to render (animation when > 1).
    #[arg(long, default_value_t = 1, value_name = "N")]
    pub frames: u32,

    /// Playback speed of animations.
    #[arg(long, default_value_t = 30.0, value_name = "F")]
    pub fps: f32,

    /// Render on the CPU even when a GPU is available.
    #[arg(long)]
    pub cpu: bool,

    /// Settings file to use instead of the user settings.
    #[arg(long, value_name = "FILE")]
    pub preset: Option<PathBuf>,

    /// Print per-file timing and mirror the log to stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// Open an interactive preview window for the first input.
    #[arg(long)]
    pub preview: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let settings = match load_settings(&args) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let save_format = parse_format(args.format.as_deref(), args.output.as_deref());
    if args.frames > 1 && !save_format.is_animated() {
        eprintln!(
            "error: --frames {} needs an animated format (gif or apng).",
            args.frames
        );
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!(
            "error: could not create output directory '{}': {}",
            dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let gpu = open_gpu(&args, &settings);
    let source: Arc<dyn ImageSource> = Arc::new(FileSource);

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            save_format,
            multi,
        ) else {
            eprintln!(
                "  error: cannot determine output path for '{}'.",
                input_path.display()
            );
            any_failure = true;
            continue;
        };

        let result = build_config(&args, &settings, input_path).and_then(|mut config| {
            config.gpu = gpu.clone();
            run_one(&args, config, Arc::clone(&source), &output_path, save_format)
        });

        match result {
            Ok(()) => {
                log_info!("Wrote {}", output_path.display());
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

/// `--preset` wins over the user settings file.
pub fn load_settings(args: &CliArgs) -> Result<RenderSettings, String> {
    match &args.preset {
        Some(path) => RenderSettings::load_from(path)
            .map_err(|e| format!("could not read preset '{}': {}", path.display(), e)),
        None => Ok(RenderSettings::load()),
    }
}

/// Shared device for every card, unless disabled.
pub fn open_gpu(args: &CliArgs, settings: &RenderSettings) -> Option<Arc<GpuContext>> {
    if args.cpu || !settings.gpu_acceleration {
        log_info!("[GPU] Disabled, rendering on CPU");
        return None;
    }
    match GpuContext::new(&settings.preferred_gpu) {
        Some(ctx) => {
            log_info!("[GPU] Using adapter {}", ctx.adapter_name);
            Some(Arc::new(ctx))
        }
        None => {
            log_warn!("[GPU] No adapter available, rendering on CPU");
            None
        }
    }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    args: &CliArgs,
    config: CardConfig,
    source: Arc<dyn ImageSource>,
    output: &Path,
    format: SaveFormat,
) -> Result<(), String> {
    // -- Step 1: Load ----------------------------------------------------
    let mut card = PolaroidCard::load(config, source)
        .wait()
        .map_err(|e| e.to_string())?;

    let grab = |card: &PolaroidCard| -> RgbaImage {
        if args.raw {
            card.surface().pixels.clone()
        } else {
            card.composed()
        }
    };

    // -- Step 2: Render --------------------------------------------------
    let pinned = parse_light(args.light.as_deref())?;
    if args.frames > 1 {
        // A pinned light holds the latch for the whole animation.
        if let Some(light) = pinned {
            card.pointer_down();
            card.pointer_move(light[0], light[1]);
        }
        let mut frames = Vec::with_capacity(args.frames as usize);
        for _ in 0..args.frames {
            card.tick();
            frames.push(grab(&card));
        }
        // -- Step 3: Save ------------------------------------------------
        encode_frames(&frames, args.fps, output, format, args.quality).map_err(|e| e.to_string())?;
    } else {
        let light = pinned.unwrap_or_else(|| LightController::orbit_position(ORBIT_SPEED * args.time));
        card.render_still(args.time, light);
        let still = grab(&card);
        encode_and_write(&still, output, format, args.quality)
            .map_err(|e| format!("save failed: {}", e))?;
    }

    Ok(())
}

/// Merge settings and flags into a card configuration for `photo`.
pub fn build_config(
    args: &CliArgs,
    settings: &RenderSettings,
    photo: &Path,
) -> Result<CardConfig, String> {
    let mut config = CardConfig::new(photo);
    config.lut = args.lut.clone();
    config.frame = args.frame.clone();
    config.hald_size = args.hald_size.unwrap_or(settings.hald_size);
    config.paper_color = settings.paper_color;
    config.max_pixel_ratio = settings.max_pixel_ratio;
    config.pixel_ratio = args.pixel_ratio;
    config.css_width = args.width.unwrap_or(settings.css_width);
    if !(config.css_width.is_finite() && config.css_width >= 1.0) {
        return Err(format!("invalid --width {}", config.css_width));
    }

    let mut e = settings.effects;
    let overrides = [
        (&mut e.lut_strength, args.lut_strength),
        (&mut e.gloss, args.gloss),
        (&mut e.spec_power, args.spec_power),
        (&mut e.fresnel, args.fresnel),
        (&mut e.streak, args.streak),
        (&mut e.roll, args.roll),
        (&mut e.grain, args.grain),
        (&mut e.vignette, args.vignette),
    ];
    for (slot, value) in overrides {
        if let Some(v) = value {
            *slot = v;
        }
    }
    config.effects = e;

    config.geometry = match &args.inset {
        Some(s) => {
            let inset = Inset::parse(s)
                .ok_or_else(|| format!("--inset expects T,R,B,L fractions, got '{}'", s))?;
            let aspect = match args.height {
                Some(h) if h.is_finite() && h >= 1.0 => h / config.css_width,
                Some(h) => return Err(format!("invalid --height {}", h)),
                None => CardGeometry::gallery().aspect(),
            };
            CardGeometry::Custom { inset, aspect }
        }
        None => {
            if args.height.is_some() {
                return Err("--height is only valid together with --inset".to_string());
            }
            let mode = match &args.mode {
                Some(m) => PolaroidMode::parse(m)
                    .ok_or_else(|| format!("unknown --mode '{}' (classic, option-a)", m))?,
                None => settings.mode,
            };
            CardGeometry::Polaroid(mode)
        }
    };

    Ok(config)
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
pub fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

fn format_from_name(name: &str) -> SaveFormat {
    match name.to_lowercase().as_str() {
        "jpeg" | "jpg" => SaveFormat::Jpeg,
        "webp" => SaveFormat::Webp,
        "bmp" => SaveFormat::Bmp,
        "tga" => SaveFormat::Tga,
        "gif" => SaveFormat::Gif,
        "apng" => SaveFormat::Apng,
        _ => SaveFormat::Png,
    }
}

/// Choose the [`SaveFormat`] from the `--format` string or infer it from the
/// output file extension. Defaults to PNG when neither is known.
pub fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> SaveFormat {
    if let Some(f) = format_arg {
        return format_from_name(f);
    }
    if let Some(out) = output {
        return format_from_name(out.extension().and_then(|e| e.to_str()).unwrap_or(""));
    }
    SaveFormat::Png
}

/// Parse `--light X,Y`.
pub fn parse_light(arg: Option<&str>) -> Result<Option<[f32; 2]>, String> {
    let Some(s) = arg else { return Ok(None) };
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|_| format!("--light expects X,Y, got '{}'", s))?;
    match parts.as_slice() {
        [x, y] => Ok(Some([*x, *y])),
        _ => Err(format!("--light expects X,Y, got '{}'", s)),
    }
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, ignored for batch input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: next to the input as `<stem>_polaroid.<ext>`
pub fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: SaveFormat,
    batch: bool,
) -> Option<PathBuf> {
    if let Some(out) = output
        && !batch
    {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_polaroid.{}", stem, ext)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["PolaroidFX", "-i", "photo.jpg"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn input_is_required() {
        assert!(CliArgs::try_parse_from(["PolaroidFX"]).is_err());
    }

    #[test]
    fn format_from_flag_or_extension() {
        assert_eq!(parse_format(Some("JPG"), None), SaveFormat::Jpeg);
        assert_eq!(parse_format(Some("apng"), None), SaveFormat::Apng);
        assert_eq!(parse_format(None, Some(Path::new("x/orbit.gif"))), SaveFormat::Gif);
        assert_eq!(parse_format(None, Some(Path::new("card.webp"))), SaveFormat::Webp);
        assert_eq!(parse_format(None, Some(Path::new("card"))), SaveFormat::Png);
        assert_eq!(parse_format(None, None), SaveFormat::Png);
    }

    #[test]
    fn output_path_priority() {
        let input = Path::new("shots/beach.jpg");
        assert_eq!(
            build_output_path(input, Some(Path::new("a.png")), None, SaveFormat::Png, false),
            Some(PathBuf::from("a.png"))
        );
        assert_eq!(
            build_output_path(input, None, Some(Path::new("out")), SaveFormat::Jpeg, false),
            Some(PathBuf::from("out/beach.jpg"))
        );
        assert_eq!(
            build_output_path(input, None, None, SaveFormat::Png, false),
            Some(PathBuf::from("shots/beach_polaroid.png"))
        );
    }

    #[test]
    fn batch_with_output_and_dir_writes_distinct_files() {
        let out = Some(Path::new("card.png"));
        let dir = Some(Path::new("cards"));
        let a = build_output_path(Path::new("a.png"), out, dir, SaveFormat::Png, true);
        let b = build_output_path(Path::new("b.png"), out, dir, SaveFormat::Png, true);
        assert_eq!(a, Some(PathBuf::from("cards/a.png")));
        assert_eq!(b, Some(PathBuf::from("cards/b.png")));
        assert_ne!(a, b);

        // A single input keeps its explicit path.
        assert_eq!(
            build_output_path(Path::new("a.png"), out, dir, SaveFormat::Png, false),
            Some(PathBuf::from("card.png"))
        );
    }

    #[test]
    fn light_parsing() {
        assert_eq!(parse_light(None), Ok(None));
        assert_eq!(parse_light(Some("0.2, 0.8")), Ok(Some([0.2, 0.8])));
        assert!(parse_light(Some("0.2")).is_err());
        assert!(parse_light(Some("a,b")).is_err());
    }

    #[test]
    fn flags_override_settings() {
        let settings = RenderSettings::default();
        let a = args(&["--gloss", "0.1", "--grain", "0", "--mode", "option-a", "--width", "300"]);
        let cfg = build_config(&a, &settings, Path::new("photo.jpg")).unwrap();
        assert_eq!(cfg.effects.gloss, 0.1);
        assert_eq!(cfg.effects.grain, 0.0);
        assert_eq!(cfg.effects.fresnel, settings.effects.fresnel);
        assert_eq!(cfg.geometry, CardGeometry::Polaroid(PolaroidMode::OptionA));
        assert_eq!(cfg.css_width, 300.0);
    }

    #[test]
    fn custom_inset_geometry() {
        let settings = RenderSettings::default();
        let a = args(&["--inset", "0.1,0.1,0.1,0.1", "--width", "400", "--height", "400"]);
        let cfg = build_config(&a, &settings, Path::new("photo.jpg")).unwrap();
        assert_eq!(
            cfg.geometry,
            CardGeometry::Custom {
                inset: Inset::uniform(0.1),
                aspect: 1.0
            }
        );

        let bad = args(&["--height", "400"]);
        assert!(build_config(&bad, &settings, Path::new("photo.jpg")).is_err());
        let bad = args(&["--inset", "0.1,0.1,0.1,0.1", "--height", "0"]);
        assert!(build_config(&bad, &settings, Path::new("photo.jpg")).is_err());
        let bad = args(&["--mode", "square"]);
        assert!(build_config(&bad, &settings, Path::new("photo.jpg")).is_err());
    }
}
