use serde::Serialize;

pub const MM_PER_INCH: f64 = 25.4;

/// Page margins in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Margins {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            left: 20.0,
            top: 5.0,
            right: 20.0,
            bottom: 5.0,
        }
    }
}

impl Margins {
    pub fn to_inches(self) -> Self {
        Self {
            left: self.left / MM_PER_INCH,
            top: self.top / MM_PER_INCH,
            right: self.right / MM_PER_INCH,
            bottom: self.bottom / MM_PER_INCH,
        }
    }
}

/// Paper dimensions in millimetres, portrait.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperSize {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PaperSize {
    pub const A4: PaperSize = PaperSize {
        width_mm: 210.0,
        height_mm: 297.0,
    };

    pub fn to_inches(self) -> (f64, f64) {
        (self.width_mm / MM_PER_INCH, self.height_mm / MM_PER_INCH)
    }
}

/// Geometry handed to the print call. Always portrait.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub paper: PaperSize,
    pub margins: Margins,
}

impl PageLayout {
    pub fn a4_portrait(margins: Margins) -> Self {
        Self {
            paper: PaperSize::A4,
            margins,
        }
    }

    /// Width and height of the area left for content, in millimetres.
    pub fn printable_mm(&self) -> (f64, f64) {
        (
            self.paper.width_mm - self.margins.left - self.margins.right,
            self.paper.height_mm - self.margins.top - self.margins.bottom,
        )
    }
}
