//! Flood extent band selection.
//!
//! Daily rasters carry either a single `SFED` band or `SFED` and `MFED` in
//! either order. Only the `SFED` band is used.

/// Label of the flood extent band.
pub const FLOOD_EXTENT_LABEL: &str = "SFED";

/// Label of the companion band in two-band rasters.
pub const COMPANION_LABEL: &str = "MFED";

/// Band layouts accepted by [`select_flood_band`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandLayout {
    /// `SFED` only
    Single,
    /// `SFED`, `MFED`
    ExtentFirst,
    /// `MFED`, `SFED`
    ExtentSecond,
}

impl BandLayout {
    /// Recognise a layout from band labels.
    pub fn detect(labels: &[Option<&str>]) -> Option<Self> {
        match labels {
            [Some(FLOOD_EXTENT_LABEL)] => Some(BandLayout::Single),
            [Some(FLOOD_EXTENT_LABEL), Some(COMPANION_LABEL)] => Some(BandLayout::ExtentFirst),
            [Some(COMPANION_LABEL), Some(FLOOD_EXTENT_LABEL)] => Some(BandLayout::ExtentSecond),
            _ => None,
        }
    }

    pub fn extent_index(&self) -> usize {
        match self {
            BandLayout::Single | BandLayout::ExtentFirst => 0,
            BandLayout::ExtentSecond => 1,
        }
    }
}

/// Index of the flood extent band, or `None` for an unrecognised layout.
pub fn select_flood_band(labels: &[Option<&str>]) -> Option<usize> {
    BandLayout::detect(labels).map(|layout| layout.extent_index())
}
