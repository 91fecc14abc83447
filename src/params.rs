// ============================================================================
// PARAMETERS - effect knobs, photo-window inset and polaroid geometry
// ============================================================================

use crate::error::CardError;

/// Numeric knobs of the compositor. Values outside the documented ranges
/// are accepted as-is; the shading math stays finite for them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectParameters {
    /// 0..1: blend between base and HALD-graded colour.
    pub lut_strength: f32,
    /// 0..1: edge darkening.
    pub vignette: f32,
    /// 0..1: temporal film grain.
    pub grain: f32,
    /// 0..1: overall laminate intensity.
    pub gloss: f32,
    /// Blinn-Phong exponent, typically 20..120.
    pub spec_power: f32,
    /// 0..1.5: edge lift at grazing angles.
    pub fresnel: f32,
    /// 0..0.9: how far the laminate normal tilts toward the edges.
    pub roll: f32,
    /// 0..1: anisotropic streak along the coating lines.
    pub streak: f32,
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self {
            lut_strength: 0.85,
            vignette: 0.45,
            grain: 0.06,
            gloss: 0.65,
            spec_power: 80.0,
            fresnel: 0.25,
            roll: 0.32,
            streak: 0.4,
        }
    }
}

/// Photo window as fractions of the whole canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Inset {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Inset {
    pub fn new(top: f32, right: f32, bottom: f32, left: f32) -> Self {
        Self { top, right, bottom, left }
    }

    pub fn uniform(v: f32) -> Self {
        Self::new(v, v, v, v)
    }

    /// Shape check: every side in [0,1] and a non-empty window.
    pub fn validate(&self) -> Result<(), CardError> {
        let sides = [self.top, self.right, self.bottom, self.left];
        if sides.iter().any(|s| !s.is_finite() || *s < 0.0 || *s > 1.0) {
            return Err(CardError::InvalidInset(format!(
                "inset sides must lie in [0,1], got {self}"
            )));
        }
        if self.left + self.right >= 1.0 {
            return Err(CardError::InvalidInset(format!(
                "left + right must be < 1, got {self}"
            )));
        }
        if self.top + self.bottom >= 1.0 {
            return Err(CardError::InvalidInset(format!(
                "top + bottom must be < 1, got {self}"
            )));
        }
        Ok(())
    }

    /// Values in shader order (top, right, bottom, left).
    pub fn to_array(&self) -> [f32; 4] {
        [self.top, self.right, self.bottom, self.left]
    }

    /// Parse `"t,r,b,l"`.
    pub fn parse(s: &str) -> Option<Self> {
        let v: Vec<f32> = s
            .split(',')
            .map(|p| p.trim().parse::<f32>())
            .collect::<Result<_, _>>()
            .ok()?;
        if v.len() != 4 {
            return None;
        }
        Some(Self::new(v[0], v[1], v[2], v[3]))
    }
}

impl std::fmt::Display for Inset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.top, self.right, self.bottom, self.left)
    }
}

// ============================================================================
// POLAROID GEOMETRY
// ============================================================================

/// Physical card size (600 / SX-70 / i-Type), inches.
pub const CARD_WIDTH_IN: f32 = 3.483;
pub const CARD_HEIGHT_IN: f32 = 4.233;
/// Physical image area, inches.
pub const IMAGE_WIDTH_IN: f32 = 3.108;
pub const IMAGE_HEIGHT_IN: f32 = 3.024;

/// How the vertical border is split between top and bottom.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolaroidMode {
    /// Top border equals the side border; the thick bottom takes the rest.
    Classic,
    /// Bottom about twice the top, friendlier for tight gallery rows.
    OptionA,
}

impl PolaroidMode {
    /// Share of the vertical leftover that goes to the bottom border.
    pub fn bottom_ratio(self) -> f32 {
        match self {
            PolaroidMode::Classic => {
                let side = (CARD_WIDTH_IN - IMAGE_WIDTH_IN) / 2.0;
                let top = side / CARD_HEIGHT_IN;
                let bottom = (CARD_HEIGHT_IN - IMAGE_HEIGHT_IN - side) / CARD_HEIGHT_IN;
                bottom / (top + bottom)
            }
            PolaroidMode::OptionA => 2.0 / 3.0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "classic" => Some(PolaroidMode::Classic),
            "option-a" | "optiona" | "option_a" => Some(PolaroidMode::OptionA),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PolaroidMode::Classic => "classic",
            PolaroidMode::OptionA => "option-a",
        }
    }
}

/// Card shape: a true polaroid, or an arbitrary window on an arbitrary canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CardGeometry {
    Polaroid(PolaroidMode),
    /// `aspect` is height / width.
    Custom { inset: Inset, aspect: f32 },
}

impl Default for CardGeometry {
    fn default() -> Self {
        CardGeometry::Polaroid(PolaroidMode::Classic)
    }
}

impl CardGeometry {
    /// Gallery-card variant: thick bottom on a 4:3 landscape canvas.
    pub fn gallery() -> Self {
        CardGeometry::Custom {
            inset: Inset::new(0.055, 0.055, 0.22, 0.055),
            aspect: 600.0 / 800.0,
        }
    }

    pub fn inset(&self) -> Inset {
        match *self {
            CardGeometry::Polaroid(mode) => {
                let side = (CARD_WIDTH_IN - IMAGE_WIDTH_IN) / 2.0 / CARD_WIDTH_IN;
                let vert = (CARD_HEIGHT_IN - IMAGE_HEIGHT_IN) / CARD_HEIGHT_IN;
                let ratio = mode.bottom_ratio();
                Inset::new(vert * (1.0 - ratio), side, vert * ratio, side)
            }
            CardGeometry::Custom { inset, .. } => inset,
        }
    }

    /// Height / width of the whole card.
    pub fn aspect(&self) -> f32 {
        match *self {
            CardGeometry::Polaroid(_) => CARD_HEIGHT_IN / CARD_WIDTH_IN,
            CardGeometry::Custom { aspect, .. } => aspect,
        }
    }

    /// CSS height for a CSS width.
    pub fn css_height(&self, css_width: f32) -> f32 {
        (css_width * self.aspect()).round()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn classic_polaroid_fractions() {
        let inset = CardGeometry::Polaroid(PolaroidMode::Classic).inset();
        assert!(close(inset.left, 0.053_832_9));
        assert!(close(inset.right, inset.left));
        assert!(close(inset.top, 0.044_294_8));
        assert!(close(inset.bottom, 0.241_318_2));
        assert!(close(PolaroidMode::Classic.bottom_ratio(), 0.844_913_2));
    }

    #[test]
    fn option_a_splits_two_to_one() {
        let inset = CardGeometry::Polaroid(PolaroidMode::OptionA).inset();
        assert!(close(inset.bottom, inset.top * 2.0));
        assert!(close(inset.top + inset.bottom, 0.285_613_0));
    }

    #[test]
    fn polaroid_height_follows_card_aspect() {
        let g = CardGeometry::default();
        assert_eq!(g.css_height(560.0), 681.0);
        assert_eq!(CardGeometry::gallery().css_height(800.0), 600.0);
    }

    #[test]
    fn inset_validation() {
        assert!(Inset::uniform(0.1).validate().is_ok());
        assert!(Inset::new(0.5, 0.0, 0.5, 0.0).validate().is_err());
        assert!(Inset::new(0.0, 0.6, 0.0, 0.4).validate().is_err());
        assert!(Inset::new(-0.1, 0.0, 0.0, 0.0).validate().is_err());
        assert!(Inset::new(f32::NAN, 0.0, 0.0, 0.0).validate().is_err());
        assert!(CardGeometry::default().inset().validate().is_ok());
    }

    #[test]
    fn inset_parses_four_values() {
        assert_eq!(Inset::parse("0.1, 0.2,0.3,0.4"), Some(Inset::new(0.1, 0.2, 0.3, 0.4)));
        assert_eq!(Inset::parse("0.1,0.2"), None);
        assert_eq!(Inset::parse("a,b,c,d"), None);
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(PolaroidMode::parse("Classic"), Some(PolaroidMode::Classic));
        assert_eq!(PolaroidMode::parse("option-a"), Some(PolaroidMode::OptionA));
        assert_eq!(PolaroidMode::parse("square"), None);
    }
}
