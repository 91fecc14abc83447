use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::{DynamicImage, ImageEncoder, ImageError, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;

use crate::error::CardError;
use crate::ops::lut::HaldLut;

// ============================================================================
// IMAGE SOURCES
// ============================================================================

/// Something that can turn a path into decoded RGBA pixels.
/// Cards never read files directly; the host hands them a source.
pub trait ImageSource: Send + Sync {
    fn load(&self, path: &Path) -> Result<RgbaImage, String>;
}

/// Reads and decodes files from disk with the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileSource;

impl ImageSource for FileSource {
    fn load(&self, path: &Path) -> Result<RgbaImage, String> {
        let img = image::open(path).map_err(|e| e.to_string())?;
        Ok(img.to_rgba8())
    }
}

/// A load running on the rayon pool.
pub struct PendingImage {
    pub path: PathBuf,
    rx: mpsc::Receiver<Result<RgbaImage, String>>,
    result: Option<Result<RgbaImage, String>>,
}

impl PendingImage {
    /// Non-blocking. `Some` once the job has finished; the result can be
    /// taken exactly once with [`PendingImage::take`].
    pub fn poll(&mut self) -> bool {
        if self.result.is_some() {
            return true;
        }
        match self.rx.try_recv() {
            Ok(res) => {
                self.result = Some(res);
                true
            }
            Err(mpsc::TryRecvError::Empty) => false,
            Err(mpsc::TryRecvError::Disconnected) => {
                self.result = Some(Err("loader thread exited without a result".to_string()));
                true
            }
        }
    }

    /// Block until the job finishes.
    pub fn wait(&mut self) {
        if self.result.is_some() {
            return;
        }
        let res = self
            .rx
            .recv()
            .unwrap_or_else(|_| Err("loader thread exited without a result".to_string()));
        self.result = Some(res);
    }

    pub fn take(&mut self) -> Option<Result<RgbaImage, String>> {
        self.result.take()
    }
}

/// Start decoding `path` in the background. One shot, no retry.
pub fn spawn_load(source: Arc<dyn ImageSource>, path: PathBuf) -> PendingImage {
    let (tx, rx) = mpsc::channel();
    let job_path = path.clone();
    rayon::spawn(move || {
        let res = source.load(&job_path);
        let _ = tx.send(res);
    });
    PendingImage {
        path,
        rx,
        result: None,
    }
}

// ============================================================================
// LUT LOADING
// ============================================================================

/// Validate a decoded LUT image against the declared HALD size.
pub fn lut_from_image(path: &Path, image: RgbaImage, size: u32) -> Result<HaldLut, CardError> {
    HaldLut::new(image, size).map_err(|reason| CardError::LutLoad {
        path: path.to_path_buf(),
        reason,
    })
}

/// Turn the outcome of a LUT load into a usable LUT, falling back to the
/// neutral table (with a warning) on any failure.
pub fn lut_or_neutral(result: Result<HaldLut, CardError>) -> HaldLut {
    match result {
        Ok(lut) => lut,
        Err(e) => {
            crate::log_warn!("{}; grading disabled", e);
            HaldLut::neutral()
        }
    }
}

/// Finish a LUT load: decode outcome (`None` when the job never reported)
/// to a validated LUT, or the neutral one.
pub fn resolve_lut(path: &Path, loaded: Option<Result<RgbaImage, String>>, size: u32) -> HaldLut {
    let result = match loaded {
        Some(Ok(img)) => lut_from_image(path, img, size),
        Some(Err(reason)) => Err(CardError::LutLoad {
            path: path.to_path_buf(),
            reason,
        }),
        None => Err(CardError::LutLoad {
            path: path.to_path_buf(),
            reason: "load did not complete".to_string(),
        }),
    };
    lut_or_neutral(result)
}

// ============================================================================
// SAVE FORMATS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tga,
    Gif,
    Apng,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Webp => "webp",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Gif => "gif",
            SaveFormat::Apng => "png",
        }
    }

    /// Formats that can carry more than one frame.
    pub fn is_animated(&self) -> bool {
        matches!(self, SaveFormat::Gif | SaveFormat::Apng)
    }
}

// ============================================================================
// THREAD-SAFE IMAGE ENCODING
// ============================================================================

/// Encode and write a single image to a file.
pub fn encode_and_write(
    image: &RgbaImage,
    path: &Path,
    format: SaveFormat,
    quality: u8,
) -> Result<(), ImageError> {
    match format {
        SaveFormat::Gif => {
            return encode_static_gif(image, path)
                .map_err(|e| ImageError::IoError(std::io::Error::other(e)));
        }
        SaveFormat::Apng => {
            return encode_animated_png(std::slice::from_ref(image), 1.0, path)
                .map_err(|e| ImageError::IoError(std::io::Error::other(e)));
        }
        SaveFormat::Webp => {
            let dyn_img = DynamicImage::ImageRgba8(image.clone());
            return dyn_img.save_with_format(path, image::ImageFormat::WebP);
        }
        _ => {}
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    match format {
        SaveFormat::Png => {
            PngEncoder::new(&mut writer).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Jpeg => {
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Tga => {
            TgaEncoder::new(&mut writer).encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Gif | SaveFormat::Apng | SaveFormat::Webp => {}
    }

    Ok(())
}

/// Write a sequence of frames. Single-frame formats get the first frame.
pub fn encode_frames(
    frames: &[RgbaImage],
    fps: f32,
    path: &Path,
    format: SaveFormat,
    quality: u8,
) -> Result<(), CardError> {
    match format {
        SaveFormat::Gif => encode_animated_gif(frames, fps, 256, path).map_err(CardError::Encode),
        SaveFormat::Apng => encode_animated_png(frames, fps, path).map_err(CardError::Encode),
        _ => {
            let first = frames
                .first()
                .ok_or_else(|| CardError::Encode("No frames to encode".to_string()))?;
            encode_and_write(first, path, format, quality)?;
            Ok(())
        }
    }
}

// ============================================================================
// ANIMATION ENCODING
// ============================================================================

fn encode_static_gif(image: &RgbaImage, path: &Path) -> Result<(), String> {
    encode_animated_gif(std::slice::from_ref(image), 1.0, 256, path)
}

/// Encode frames as a looping GIF with a NeuQuant palette per frame.
/// Fully transparent pixels map to a reserved transparent index.
pub fn encode_animated_gif(
    frames: &[RgbaImage],
    fps: f32,
    max_colors: u16,
    path: &Path,
) -> Result<(), String> {
    if frames.is_empty() {
        return Err("No frames to encode".to_string());
    }
    if frames[0].width() > u16::MAX as u32 || frames[0].height() > u16::MAX as u32 {
        return Err("Image dimensions exceed GIF maximum (65535×65535)".to_string());
    }
    let (w, h) = (frames[0].width() as u16, frames[0].height() as u16);
    let delay_cs = ((100.0 / fps.max(0.01)).round() as u16).max(2);

    let file = File::create(path).map_err(|e| format!("Failed to create GIF file: {}", e))?;

    // Index 0 is reserved for transparency; NeuQuant fills the rest.
    let colors = (max_colors as usize).clamp(2, 256) - 1;
    let (global_palette, _, _) = quantize_rgba(&frames[0], colors);

    let mut encoder = gif::Encoder::new(BufWriter::new(file), w, h, &global_palette)
        .map_err(|e| format!("GIF encoder init error: {}", e))?;
    if frames.len() > 1 {
        encoder
            .set_repeat(gif::Repeat::Infinite)
            .map_err(|e| format!("GIF set repeat error: {}", e))?;
    }

    for frame_img in frames {
        if frame_img.dimensions() != frames[0].dimensions() {
            return Err("All frames must share the same dimensions".to_string());
        }
        let (palette, indexed, has_transparency) = quantize_rgba(frame_img, colors);
        let frame = gif::Frame {
            width: w,
            height: h,
            delay: delay_cs,
            dispose: gif::DisposalMethod::Background,
            transparent: has_transparency.then_some(0),
            palette: Some(palette),
            buffer: std::borrow::Cow::Owned(indexed),
            ..Default::default()
        };
        encoder
            .write_frame(&frame)
            .map_err(|e| format!("GIF frame write error: {}", e))?;
    }

    Ok(())
}

/// Encode frames as an infinitely looping APNG.
pub fn encode_animated_png(frames: &[RgbaImage], fps: f32, path: &Path) -> Result<(), String> {
    if frames.is_empty() {
        return Err("No frames to encode".to_string());
    }

    let width = frames[0].width();
    let height = frames[0].height();
    let delay_ms = (1000.0 / fps.max(0.01)).round().clamp(1.0, 65535.0) as u16;

    let file = File::create(path).map_err(|e| format!("Failed to create APNG file: {}", e))?;
    let writer = BufWriter::new(file);

    let mut encoder = png::Encoder::new(writer, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder
        .set_animated(frames.len() as u32, 0)
        .map_err(|e| format!("APNG set_animated error: {}", e))?;

    let mut writer = encoder
        .write_header()
        .map_err(|e| format!("APNG header write error: {}", e))?;

    for frame_img in frames {
        if frame_img.dimensions() != (width, height) {
            return Err("All frames must share the same dimensions".to_string());
        }
        writer
            .set_frame_delay(delay_ms, 1000)
            .map_err(|e| format!("APNG set frame delay error: {}", e))?;
        writer
            .set_dispose_op(png::DisposeOp::Background)
            .map_err(|e| format!("APNG set dispose op error: {}", e))?;
        writer
            .write_image_data(frame_img.as_raw())
            .map_err(|e| format!("APNG frame write error: {}", e))?;
    }

    writer
        .finish()
        .map_err(|e| format!("APNG finish error: {}", e))?;

    Ok(())
}

/// Quantize an RGBA image to indexed colour.
/// Returns `(flat RGB palette, indices, any_transparent)`. Palette slot 0 is
/// the transparent entry; opaque colours use slots `1..=max_colors`.
fn quantize_rgba(image: &RgbaImage, max_colors: usize) -> (Vec<u8>, Vec<u8>, bool) {
    let opaque: Vec<u8> = image
        .pixels()
        .filter(|p| p[3] >= 128)
        .flat_map(|p| [p[0], p[1], p[2], 255])
        .collect();

    let mut palette = Vec::with_capacity((max_colors + 1) * 3);
    palette.extend_from_slice(&[0, 0, 0]);

    let nq = (!opaque.is_empty()).then(|| color_quant::NeuQuant::new(10, max_colors, &opaque));
    for i in 0..max_colors {
        match nq.as_ref().and_then(|nq| nq.lookup(i)) {
            Some(color) => palette.extend_from_slice(&color[..3]),
            None => palette.extend_from_slice(&[0, 0, 0]),
        }
    }

    let mut any_transparent = false;
    let indices = image
        .pixels()
        .map(|p| {
            if p[3] < 128 {
                any_transparent = true;
                return 0;
            }
            match &nq {
                Some(nq) => (nq.index_of(&[p[0], p[1], p[2], 255]) + 1) as u8,
                None => 0,
            }
        })
        .collect();

    (palette, indices, any_transparent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::lut::identity_hald;
    use image::Rgba;

    struct MapSource(Vec<(PathBuf, RgbaImage)>);

    impl ImageSource for MapSource {
        fn load(&self, path: &Path) -> Result<RgbaImage, String> {
            self.0
                .iter()
                .find(|(p, _)| p == path)
                .map(|(_, img)| img.clone())
                .ok_or_else(|| format!("no such image: {}", path.display()))
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("polaroidfx_io_tests");
        let _ = std::fs::create_dir_all(&dir);
        dir.join(name)
    }

    #[test]
    fn missing_lut_falls_back_to_neutral() {
        let src = MapSource(vec![]);
        let path = Path::new("nope.png");
        let lut = resolve_lut(path, Some(src.load(path)), 16);
        assert!(lut.is_neutral());
        assert_eq!(lut.size(), 0);
        assert!(resolve_lut(path, None, 16).is_neutral());
    }

    #[test]
    fn mis_sized_lut_falls_back_to_neutral() {
        let src = MapSource(vec![(PathBuf::from("lut.png"), identity_hald(8))]);
        let path = Path::new("lut.png");
        assert!(resolve_lut(path, Some(src.load(path)), 16).is_neutral());
        assert_eq!(resolve_lut(path, Some(src.load(path)), 8).size(), 8);
    }

    #[test]
    fn background_load_delivers_once() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
        let src: Arc<dyn ImageSource> = Arc::new(MapSource(vec![(PathBuf::from("a"), img)]));
        let mut pending = spawn_load(src, PathBuf::from("a"));
        pending.wait();
        assert!(pending.poll());
        let got = pending.take().unwrap().unwrap();
        assert_eq!(got.get_pixel(1, 1).0, [1, 2, 3, 255]);
        assert!(pending.take().is_none());
    }

    #[test]
    fn background_load_reports_failure() {
        let src: Arc<dyn ImageSource> = Arc::new(MapSource(vec![]));
        let mut pending = spawn_load(src, PathBuf::from("missing"));
        pending.wait();
        assert!(pending.take().unwrap().is_err());
    }

    #[test]
    fn gif_and_apng_encoders_write_files() {
        let frames: Vec<RgbaImage> = (0..3)
            .map(|i| {
                RgbaImage::from_fn(12, 10, |x, y| {
                    if x < 2 {
                        Rgba([0, 0, 0, 0])
                    } else {
                        Rgba([(x * 20) as u8, (y * 20) as u8, (i * 60) as u8, 255])
                    }
                })
            })
            .collect();

        let gif_path = temp_path("orbit.gif");
        encode_animated_gif(&frames, 12.0, 256, &gif_path).unwrap();
        let bytes = std::fs::read(&gif_path).unwrap();
        assert_eq!(&bytes[..3], b"GIF");

        let apng_path = temp_path("orbit.png");
        encode_animated_png(&frames, 12.0, &apng_path).unwrap();
        let decoded = image::open(&apng_path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 10));
    }

    #[test]
    fn static_formats_round_trip_dimensions() {
        let img = RgbaImage::from_pixel(7, 5, Rgba([200, 100, 50, 255]));
        for format in [SaveFormat::Png, SaveFormat::Jpeg, SaveFormat::Bmp, SaveFormat::Tga] {
            let path = temp_path(&format!("still.{}", format.extension()));
            encode_and_write(&img, &path, format, 90).unwrap();
            let back = image::open(&path).unwrap();
            assert_eq!((back.width(), back.height()), (7, 5), "{format:?}");
        }
    }

    #[test]
    fn empty_frame_list_is_an_error() {
        assert!(encode_animated_png(&[], 10.0, &temp_path("none.png")).is_err());
        assert!(encode_frames(&[], 10.0, &temp_path("none.bmp"), SaveFormat::Bmp, 90).is_err());
    }
}
