use std::time::Instant;

use cathode_common::types::{Cell, CellFlags, Color, Pos, Rect, Size};

use crate::term::Grid;
use crate::width::{grapheme_width, graphemes};

/// A render target: a cell grid plus the cell pixel metrics it was built
/// for. Surfaces are diffed pairwise to produce minimal updates.
#[derive(Debug, Clone)]
pub struct Surface {
    grid: Grid,
    cell_px: (f32, f32),
}

impl Surface {
    pub fn new(size: Size, cell_px: (f32, f32)) -> Self {
        Self {
            grid: Grid::new(size),
            cell_px,
        }
    }

    pub fn size(&self) -> Size {
        self.grid.size()
    }

    pub fn cell_px(&self) -> (f32, f32) {
        self.cell_px
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn cell(&self, x: u16, y: u16) -> Option<&Cell> {
        self.grid.cell(x, y)
    }

    pub fn clear(&mut self) {
        self.grid.clear();
    }

    pub(crate) fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }
}

/// The style a context writes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    pub fg: Option<Color>,
    pub bg: Option<Color>,
    pub flags: CellFlags,
}

/// Grapheme- and width-aware writer over a surface. Containers hand a
/// context to each child clipped to the child's bounds.
pub struct RenderContext<'a> {
    surface: &'a mut Surface,
    clip: Rect,
    pos: Pos,
    style: Style,
}

impl<'a> RenderContext<'a> {
    pub fn new(surface: &'a mut Surface) -> Self {
        let clip = Rect::new(0, 0, surface.size().width, surface.size().height);
        Self {
            surface,
            clip,
            pos: Pos::new(clip.x, clip.y),
            style: Style::default(),
        }
    }

    pub fn size(&self) -> Size {
        self.surface.size()
    }

    pub fn clip(&self) -> Rect {
        self.clip
    }

    pub fn style(&self) -> Style {
        self.style
    }

    pub fn set_style(&mut self, style: Style) {
        self.style = style;
    }

    pub fn move_to(&mut self, x: u16, y: u16) {
        self.pos = Pos::new(x, y);
    }

    pub fn cursor(&self) -> Pos {
        self.pos
    }

    /// A context restricted to `bounds` (intersected with the current
    /// clip), positioned at its top-left.
    pub fn clipped(&mut self, bounds: Rect) -> RenderContext<'_> {
        let clip = self.clip.intersection(bounds);
        RenderContext {
            surface: &mut *self.surface,
            clip,
            pos: Pos::new(clip.x, clip.y),
            style: self.style,
        }
    }

    /// Write text at the current position, advancing by display width.
    /// Wide graphemes occupy an origin cell plus a continuation; a wide
    /// grapheme that would straddle the clip edge is replaced by a blank.
    pub fn print(&mut self, text: &str) {
        for cluster in graphemes(text) {
            let width = grapheme_width(cluster);
            if width == 0 {
                self.append_combining(cluster);
                continue;
            }
            if self.pos.x + width > self.clip.right() {
                if width == 2 && self.pos.x + 1 == self.clip.right() {
                    // Half a wide char does not fit; pad and stop the run.
                    self.put_cell(self.pos.x, self.pos.y, " ", false);
                    self.pos.x += 1;
                }
                return;
            }
            if self.pos.y >= self.clip.bottom() {
                return;
            }
            for i in 0..width {
                self.clean_wide(self.pos.x + i, self.pos.y);
            }
            self.put_cell(self.pos.x, self.pos.y, cluster, false);
            for i in 1..width {
                self.put_cell(self.pos.x + i, self.pos.y, "", true);
            }
            self.pos.x += width;
        }
    }

    pub fn fill(&mut self, rect: Rect, grapheme: &str) {
        let rect = self.clip.intersection(rect);
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                self.clean_wide(x, y);
                self.put_cell(x, y, grapheme, false);
            }
        }
    }

    /// Writing over half of a wide grapheme orphans the other half;
    /// blank it so continuation cells always sit next to a live origin.
    /// The partner may lie outside the clip, in which case the stale
    /// half is still corrected at the grid level.
    fn clean_wide(&mut self, x: u16, y: u16) {
        let grid = self.surface.grid_mut();
        let Some(cell) = grid.cell(x, y) else {
            return;
        };
        if cell.is_continuation() {
            if x > 0
                && grid
                    .cell(x - 1, y)
                    .is_some_and(|origin| !origin.is_continuation())
            {
                grid.set(x - 1, y, Cell::blank());
            }
        } else if grapheme_width(&cell.grapheme) > 1
            && grid.cell(x + 1, y).is_some_and(Cell::is_continuation)
        {
            grid.set(x + 1, y, Cell::blank());
        }
    }

    fn append_combining(&mut self, cluster: &str) {
        if self.pos.x == self.clip.x {
            return;
        }
        let (x, y) = (self.pos.x - 1, self.pos.y);
        if let Some(cell) = self.surface.grid_mut().cell_mut(x, y) {
            if !cell.is_continuation() {
                cell.grapheme.push_str(cluster);
            }
        }
    }

    fn put_cell(&mut self, x: u16, y: u16, grapheme: &str, continuation: bool) {
        if !self.clip.contains(Pos::new(x, y)) {
            return;
        }
        let cell = Cell {
            grapheme: if continuation {
                String::new()
            } else {
                grapheme.to_string()
            },
            fg: self.style.fg,
            bg: self.style.bg,
            flags: self.style.flags,
            write_seq: 0,
            written_at: Instant::now(),
            sixel: None,
            hyperlink: None,
        };
        self.surface.grid_mut().set(x, y, cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_advances_by_display_width() {
        let mut surface = Surface::new(Size::new(8, 2), (10.0, 20.0));
        let mut ctx = RenderContext::new(&mut surface);
        ctx.print("a漢b");
        assert_eq!(surface.cell(0, 0).unwrap().grapheme, "a");
        assert_eq!(surface.cell(1, 0).unwrap().grapheme, "漢");
        assert!(surface.cell(2, 0).unwrap().is_continuation());
        assert_eq!(surface.cell(3, 0).unwrap().grapheme, "b");
    }

    #[test]
    fn wide_grapheme_does_not_straddle_the_edge() {
        let mut surface = Surface::new(Size::new(3, 1), (10.0, 20.0));
        let mut ctx = RenderContext::new(&mut surface);
        ctx.print("ab漢");
        assert_eq!(surface.cell(2, 0).unwrap().grapheme, " ");
    }

    #[test]
    fn clip_bounds_writes() {
        let mut surface = Surface::new(Size::new(6, 3), (10.0, 20.0));
        let mut ctx = RenderContext::new(&mut surface);
        let mut child = ctx.clipped(Rect::new(2, 1, 2, 1));
        child.print("wxyz");
        assert_eq!(surface.cell(2, 1).unwrap().grapheme, "w");
        assert_eq!(surface.cell(3, 1).unwrap().grapheme, "x");
        // Clipped out.
        assert_eq!(surface.cell(4, 1).unwrap().grapheme, " ");
        assert_eq!(surface.cell(1, 1).unwrap().grapheme, " ");
    }

    #[test]
    fn styles_flow_into_cells() {
        let mut surface = Surface::new(Size::new(4, 1), (10.0, 20.0));
        let mut ctx = RenderContext::new(&mut surface);
        ctx.set_style(Style {
            fg: Some(Color::Palette(1)),
            bg: None,
            flags: CellFlags::BOLD,
        });
        ctx.print("!");
        let cell = surface.cell(0, 0).unwrap();
        assert_eq!(cell.fg, Some(Color::Palette(1)));
        assert!(cell.flags.contains(CellFlags::BOLD));
    }
}
