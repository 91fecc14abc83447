// ============================================================================
// PolaroidFX - glossy instant-film card compositor
// ============================================================================
//
//   ops/       pure pixel math (noise, sampling, HALD LUT, shading, overlay)
//   params     effect knobs, photo-window inset, polaroid geometry
//   canvas     render surface + rayon CPU pass
//   gpu/       wgpu pipeline mirroring the CPU pass
//   io         image sources, background loads, encoders
//   card       per-instance compositor (clock, light, resize, unmount)
//   settings   persisted defaults
//   cli        batch front-end, preview: interactive window

pub mod logger;

pub mod canvas;
pub mod card;
pub mod cli;
pub mod error;
pub mod gpu;
pub mod io;
pub mod ops;
pub mod params;
pub mod preview;
pub mod settings;

pub use card::{CardConfig, PendingCard, PolaroidCard};
pub use error::CardError;
pub use params::{CardGeometry, EffectParameters, Inset, PolaroidMode};
