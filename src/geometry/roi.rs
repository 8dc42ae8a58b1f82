use crate::foundation::core::RelPoint;

/// Mirror adjustments applied to a [`Roi`] before any turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Flip {
    /// Mirror left/right.
    pub horizontal: bool,
    /// Mirror top/bottom.
    pub vertical: bool,
}

impl Flip {
    /// True when neither axis is mirrored.
    pub fn is_identity(self) -> bool {
        !self.horizontal && !self.vertical
    }
}

/// Region of interest: four named corners in relative `[0,1]²` video
/// coordinates locating the design within a frame.
///
/// Flip/turn adjustments are pure functions computed fresh from the
/// stored corners; they are never accumulated into them.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Roi {
    /// Bottom-left corner.
    pub bl: RelPoint,
    /// Top-left corner.
    pub tl: RelPoint,
    /// Top-right corner.
    pub tr: RelPoint,
    /// Bottom-right corner.
    pub br: RelPoint,
}

impl Roi {
    /// Corners in the fixed order used by the transform estimator:
    /// BL, TL, TR, BR.
    pub fn corners(&self) -> [RelPoint; 4] {
        [self.bl, self.tl, self.tr, self.br]
    }

    /// Relabel corners for a mirrored and/or turned design.
    ///
    /// The flip is applied first, then `turn mod 4` clockwise quarter-turn
    /// relabelings. Flipping both axes equals a half turn. The receiver is
    /// unchanged; the result is always derived from the stored corners.
    pub fn adjust(&self, flip: Flip, turn: i32) -> Roi {
        let mut roi = *self;

        if flip.horizontal {
            roi = Roi {
                bl: roi.br,
                tl: roi.tr,
                tr: roi.tl,
                br: roi.bl,
            };
        }
        if flip.vertical {
            roi = Roi {
                bl: roi.tl,
                tl: roi.bl,
                tr: roi.br,
                br: roi.tr,
            };
        }

        for _ in 0..turn.rem_euclid(4) {
            roi = Roi {
                bl: roi.br,
                tl: roi.bl,
                tr: roi.tl,
                br: roi.tr,
            };
        }

        roi
    }
}

#[cfg(test)]
#[path = "../../tests/unit/geometry/roi.rs"]
mod tests;
