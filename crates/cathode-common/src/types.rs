use std::sync::Arc;
use std::time::Instant;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Terminal dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u16,
    pub height: u16,
}

impl Size {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Cell position, 0-indexed, `x` is the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pos {
    pub x: u16,
    pub y: u16,
}

impl Pos {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// A rectangle in cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn right(&self) -> u16 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u16 {
        self.y.saturating_add(self.height)
    }

    pub fn contains(&self, pos: Pos) -> bool {
        pos.x >= self.x && pos.x < self.right() && pos.y >= self.y && pos.y < self.bottom()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn intersection(&self, other: Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Rect {
            x,
            y,
            width: right.saturating_sub(x),
            height: bottom.saturating_sub(y),
        }
    }
}

/// A terminal color. Equality is structural; `Default` means "inherit the
/// terminal's own default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Color {
    #[default]
    Default,
    /// One of the 16 base palette entries (0..=15).
    Palette(u8),
    /// 256-color palette index.
    Indexed(u8),
    /// True-color RGB.
    Rgb(u8, u8, u8),
}

bitflags! {
    /// Cell display attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct CellFlags: u16 {
        const BOLD          = 1 << 0;
        const DIM           = 1 << 1;
        const ITALIC        = 1 << 2;
        const UNDERLINE     = 1 << 3;
        const BLINK         = 1 << 4;
        const REVERSE       = 1 << 5;
        const HIDDEN        = 1 << 6;
        const STRIKETHROUGH = 1 << 7;
        const OVERLINE      = 1 << 8;
        /// The cell is covered by a Sixel image.
        const SIXEL         = 1 << 9;
    }
}

/// An interned Sixel payload shared by every cell the image covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SixelImage {
    /// The raw DCS payload, passed through opaquely.
    pub data: Vec<u8>,
    pub width_cells: u16,
    pub height_cells: u16,
}

/// An interned OSC 8 hyperlink shared by every cell it spans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hyperlink {
    pub uri: String,
    pub id: Option<String>,
}

/// A single grid cell. An empty grapheme marks the continuation cell of a
/// wide character; the origin cell immediately to its left holds the
/// grapheme and shares its `write_seq`.
#[derive(Debug, Clone)]
pub struct Cell {
    pub grapheme: String,
    pub fg: Option<Color>,
    pub bg: Option<Color>,
    pub flags: CellFlags,
    pub write_seq: u64,
    pub written_at: Instant,
    pub sixel: Option<Arc<SixelImage>>,
    pub hyperlink: Option<Arc<Hyperlink>>,
}

impl Cell {
    pub fn blank() -> Self {
        Self {
            grapheme: " ".to_string(),
            fg: None,
            bg: None,
            flags: CellFlags::empty(),
            write_seq: 0,
            written_at: Instant::now(),
            sixel: None,
            hyperlink: None,
        }
    }

    /// True for the trailing cells of a wide grapheme.
    pub fn is_continuation(&self) -> bool {
        self.grapheme.is_empty()
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::blank()
    }
}

// Visual equality: the write bookkeeping (`write_seq`, `written_at`) is
// excluded so frame diffing only reacts to what a viewer could see.
// Interning guarantees payload identity, so Arc pointer equality suffices.
impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.grapheme == other.grapheme
            && self.fg == other.fg
            && self.bg == other.bg
            && self.flags == other.flags
            && arc_eq(&self.sixel, &other.sixel)
            && arc_eq(&self.hyperlink, &other.hyperlink)
    }
}

impl Eq for Cell {}

fn arc_eq<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// Cursor shape as set by `CSI Ps SP q` (DECSCUSR).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorShape {
    #[default]
    Default,
    BlinkingBlock,
    SteadyBlock,
    BlinkingUnderline,
    SteadyUnderline,
    BlinkingBar,
    SteadyBar,
}

impl CursorShape {
    pub fn from_param(param: u16) -> Self {
        match param {
            1 => Self::BlinkingBlock,
            2 => Self::SteadyBlock,
            3 => Self::BlinkingUnderline,
            4 => Self::SteadyUnderline,
            5 => Self::BlinkingBar,
            6 => Self::SteadyBar,
            _ => Self::Default,
        }
    }

    pub fn to_param(self) -> u16 {
        match self {
            Self::Default => 0,
            Self::BlinkingBlock => 1,
            Self::SteadyBlock => 2,
            Self::BlinkingUnderline => 3,
            Self::SteadyUnderline => 4,
            Self::BlinkingBar => 5,
            Self::SteadyBar => 6,
        }
    }
}

/// What a presentation adapter can do. Cell pixel metrics are kept as
/// floating values; consumers that need whole cells round with `ceil`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capabilities {
    pub mouse: bool,
    pub colors_256: bool,
    pub true_color: bool,
    pub alternate_screen: bool,
    /// The presentation keeps its own main-screen buffer, so the emulator
    /// must not synthesize restore writes on alt-screen exit.
    pub native_alternate_screen: bool,
    pub bracketed_paste: bool,
    pub sixel: bool,
    pub cell_px_w: f32,
    pub cell_px_h: f32,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            mouse: true,
            colors_256: true,
            true_color: true,
            alternate_screen: true,
            native_alternate_screen: false,
            bracketed_paste: true,
            sixel: false,
            cell_px_w: 10.0,
            cell_px_h: 20.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_visual_equality_ignores_write_seq() {
        let mut a = Cell::blank();
        let mut b = Cell::blank();
        a.write_seq = 1;
        b.write_seq = 99;
        assert_eq!(a, b);

        b.grapheme = "x".to_string();
        assert_ne!(a, b);
    }

    #[test]
    fn cell_equality_tracks_hyperlink_identity() {
        let link = Arc::new(Hyperlink {
            uri: "https://example.com".into(),
            id: None,
        });
        let mut a = Cell::blank();
        let mut b = Cell::blank();
        a.hyperlink = Some(Arc::clone(&link));
        b.hyperlink = Some(Arc::clone(&link));
        assert_eq!(a, b);

        b.hyperlink = Some(Arc::new(Hyperlink {
            uri: "https://example.com".into(),
            id: None,
        }));
        assert_ne!(a, b);
    }

    #[test]
    fn rect_contains_and_intersection() {
        let r = Rect::new(2, 3, 4, 2);
        assert!(r.contains(Pos::new(2, 3)));
        assert!(r.contains(Pos::new(5, 4)));
        assert!(!r.contains(Pos::new(6, 3)));
        assert!(!r.contains(Pos::new(2, 5)));

        let other = Rect::new(4, 0, 10, 4);
        let hit = r.intersection(other);
        assert_eq!(hit, Rect::new(4, 3, 2, 1));
    }

    #[test]
    fn cursor_shape_param_round_trip() {
        for p in 0..=6 {
            assert_eq!(CursorShape::from_param(p).to_param(), p);
        }
        assert_eq!(CursorShape::from_param(42), CursorShape::Default);
    }
}
