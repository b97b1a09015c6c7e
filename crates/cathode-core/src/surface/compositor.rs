use cathode_common::types::{Cell, CellFlags, Color, CursorShape, Pos, Size};
use cathode_parser::token::{ClearScreenMode, Token};
use cathode_parser::serialize;
use tracing::debug;

use super::surface::{RenderContext, Style, Surface};
use crate::width::grapheme_width;

/// Cursor state emitted after the cell runs, separately from the diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorState {
    pub pos: Pos,
    pub visible: bool,
    pub shape: CursorShape,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            pos: Pos::new(0, 0),
            visible: true,
            shape: CursorShape::Default,
        }
    }
}

/// Double-buffered compositor: renders into the current surface, diffs
/// against the previous one, and serializes the minimal ANSI update.
pub struct Compositor {
    current: Surface,
    previous: Surface,
    first_frame: bool,
    emitted_cursor: Option<CursorState>,
}

impl Compositor {
    pub fn new(size: Size, cell_px: (f32, f32)) -> Self {
        Self {
            current: Surface::new(size, cell_px),
            previous: Surface::new(size, cell_px),
            first_frame: true,
            emitted_cursor: None,
        }
    }

    pub fn size(&self) -> Size {
        self.current.size()
    }

    pub fn current(&self) -> &Surface {
        &self.current
    }

    /// Start a frame. A change of dimensions or cell metrics recreates
    /// both buffers and forces a full redraw; otherwise the buffers swap
    /// and the new current surface is cleared.
    pub fn begin_frame(&mut self, size: Size, cell_px: (f32, f32)) -> RenderContext<'_> {
        if size != self.current.size() || cell_px != self.current.cell_px() {
            debug!(?size, "surface metrics changed; full redraw");
            self.current = Surface::new(size, cell_px);
            self.previous = Surface::new(size, cell_px);
            self.first_frame = true;
            self.emitted_cursor = None;
        } else {
            std::mem::swap(&mut self.current, &mut self.previous);
            self.current.clear();
        }
        RenderContext::new(&mut self.current)
    }

    /// Request a full redraw on the next `end_frame` even if metrics did
    /// not change (e.g. after a presentation resize notification).
    pub fn invalidate_all(&mut self) {
        self.first_frame = true;
        self.emitted_cursor = None;
    }

    /// Finish the frame: diff, convert to tokens, serialize. After the
    /// returned bytes are applied the peer's screen equals the current
    /// surface, cursor state included.
    pub fn end_frame(&mut self, cursor: CursorState) -> Vec<u8> {
        let mut tokens = Vec::new();
        if self.first_frame {
            tokens.push(Token::Sgr(vec![0]));
            tokens.push(Token::ClearScreen(ClearScreenMode::All));
            tokens.push(Token::CursorPosition { row: 1, col: 1 });
        }

        let empty = Surface::new(self.current.size(), self.current.cell_px());
        let baseline = if self.first_frame {
            &empty
        } else {
            &self.previous
        };
        diff_tokens(baseline, &self.current, &mut tokens);
        self.first_frame = false;

        self.emit_cursor(cursor, &mut tokens);
        serialize(&tokens)
    }

    fn emit_cursor(&mut self, cursor: CursorState, tokens: &mut Vec<Token>) {
        let previous = self.emitted_cursor;
        if previous.map(|c| c.pos) != Some(cursor.pos) || !tokens.is_empty() {
            tokens.push(Token::CursorPosition {
                row: cursor.pos.y + 1,
                col: cursor.pos.x + 1,
            });
        }
        if previous.map(|c| c.visible) != Some(cursor.visible) {
            tokens.push(Token::PrivateMode {
                mode: 25,
                enable: cursor.visible,
            });
        }
        if previous.map(|c| c.shape) != Some(cursor.shape) {
            tokens.push(Token::CursorShape(cursor.shape));
        }
        self.emitted_cursor = Some(cursor);
    }
}

/// Cell-by-cell diff converted to row-grouped runs: one cursor move per
/// run, SGR emitted only on style changes, horizontally contiguous cells
/// coalesced into single text tokens.
fn diff_tokens(previous: &Surface, current: &Surface, tokens: &mut Vec<Token>) {
    let size = current.size();
    let mut pen: Option<Style> = None;

    for y in 0..size.height {
        let mut changed = vec![false; size.width as usize];
        for x in 0..size.width {
            if previous.cell(x, y) != current.cell(x, y) {
                changed[x as usize] = true;
            }
        }
        // Wide graphemes are written atomically: pull the whole cluster
        // into the run when either half changed.
        for x in 0..size.width {
            if !changed[x as usize] {
                continue;
            }
            let Some(cell) = current.cell(x, y) else {
                continue;
            };
            if cell.is_continuation() && x > 0 {
                changed[x as usize - 1] = true;
            } else if grapheme_width(&cell.grapheme) > 1 && x + 1 < size.width {
                changed[x as usize + 1] = true;
            }
        }

        let mut x = 0;
        while x < size.width {
            if !changed[x as usize] {
                x += 1;
                continue;
            }
            let run_start = x;
            while x < size.width && changed[x as usize] {
                x += 1;
            }
            emit_run(current, y, run_start, x, &mut pen, tokens);
        }
    }

    if pen.is_some() {
        // Leave the peer's pen in a known state.
        tokens.push(Token::Sgr(vec![0]));
    }
}

fn emit_run(
    surface: &Surface,
    y: u16,
    start: u16,
    end: u16,
    pen: &mut Option<Style>,
    tokens: &mut Vec<Token>,
) {
    tokens.push(Token::CursorPosition {
        row: y + 1,
        col: start + 1,
    });
    let mut text = String::new();
    let mut flush = |text: &mut String, tokens: &mut Vec<Token>| {
        if !text.is_empty() {
            tokens.push(Token::Text(std::mem::take(text)));
        }
    };

    for x in start..end {
        let Some(cell) = surface.cell(x, y) else {
            continue;
        };
        if cell.is_continuation() {
            continue;
        }
        let style = Style {
            fg: cell.fg,
            bg: cell.bg,
            flags: cell.flags,
        };
        if *pen != Some(style) {
            flush(&mut text, tokens);
            tokens.push(Token::Sgr(style_params(style)));
            *pen = Some(style);
        }
        text.push_str(&cell.grapheme);
    }
    flush(&mut text, tokens);
}

/// Full respecification of a style as one SGR parameter list, starting
/// from reset. Emitting only on change keeps transitions minimal while
/// staying stateless across runs.
fn style_params(style: Style) -> Vec<u16> {
    let mut params = vec![0];
    let flag_params = [
        (CellFlags::BOLD, 1),
        (CellFlags::DIM, 2),
        (CellFlags::ITALIC, 3),
        (CellFlags::UNDERLINE, 4),
        (CellFlags::BLINK, 5),
        (CellFlags::REVERSE, 7),
        (CellFlags::HIDDEN, 8),
        (CellFlags::STRIKETHROUGH, 9),
        (CellFlags::OVERLINE, 53),
    ];
    for (flag, param) in flag_params {
        if style.flags.contains(flag) {
            params.push(param);
        }
    }
    push_color(&mut params, style.fg, false);
    push_color(&mut params, style.bg, true);
    params
}

fn push_color(params: &mut Vec<u16>, color: Option<Color>, background: bool) {
    let base: u16 = if background { 40 } else { 30 };
    match color {
        None | Some(Color::Default) => {}
        Some(Color::Palette(n)) if n < 8 => params.push(base + n as u16),
        Some(Color::Palette(n)) => params.push(base + 60 + (n as u16 - 8)),
        Some(Color::Indexed(n)) => params.extend_from_slice(&[base + 8, 5, n as u16]),
        Some(Color::Rgb(r, g, b)) => {
            params.extend_from_slice(&[base + 8, 2, r as u16, g as u16, b as u16]);
        }
    }
}

/// The diff as raw cell writes, for impact-aware presentations.
pub fn diff_cells(previous: &Surface, current: &Surface) -> Vec<(u16, u16, Cell)> {
    let size = current.size();
    let mut out = Vec::new();
    for y in 0..size.height {
        for x in 0..size.width {
            let cur = current.cell(x, y);
            if previous.cell(x, y) != cur {
                if let Some(cell) = cur {
                    out.push((x, y, cell.clone()));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Emulator;

    fn render_text(compositor: &mut Compositor, size: Size, lines: &[(u16, u16, &str)]) -> Vec<u8> {
        let mut ctx = compositor.begin_frame(size, (10.0, 20.0));
        for (x, y, text) in lines {
            ctx.move_to(*x, *y);
            ctx.print(text);
        }
        compositor.end_frame(CursorState::default())
    }

    #[test]
    fn first_frame_emits_reset_and_clear() {
        let size = Size::new(10, 3);
        let mut compositor = Compositor::new(size, (10.0, 20.0));
        let bytes = render_text(&mut compositor, size, &[(0, 0, "hi")]);
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("\x1b[0m\x1b[2J\x1b[1;1H"));
        assert!(text.contains("hi"));
    }

    #[test]
    fn unchanged_frame_emits_no_cell_runs() {
        let size = Size::new(10, 3);
        let mut compositor = Compositor::new(size, (10.0, 20.0));
        render_text(&mut compositor, size, &[(0, 0, "hi")]);
        let bytes = render_text(&mut compositor, size, &[(0, 0, "hi")]);
        // Only the cursor reposition remains.
        assert!(bytes.is_empty() || !String::from_utf8_lossy(&bytes).contains("hi"));
    }

    #[test]
    fn changed_cells_produce_one_run() {
        let size = Size::new(10, 2);
        let mut compositor = Compositor::new(size, (10.0, 20.0));
        render_text(&mut compositor, size, &[(0, 0, "aaaa")]);
        let bytes = render_text(&mut compositor, size, &[(0, 0, "abba")]);
        let text = String::from_utf8_lossy(&bytes);
        // Only the middle cells changed; the run targets column 2.
        assert!(text.contains("\x1b[1;2H"), "got: {text:?}");
        assert!(text.contains("bb"));
        assert!(!text.contains("aa"));
    }

    #[test]
    fn metric_change_forces_full_redraw() {
        let size = Size::new(6, 2);
        let mut compositor = Compositor::new(size, (10.0, 20.0));
        render_text(&mut compositor, size, &[(0, 0, "x")]);
        let bytes = render_text(&mut compositor, Size::new(7, 2), &[(0, 0, "x")]);
        assert!(String::from_utf8_lossy(&bytes).contains("\x1b[2J"));
    }

    /// Applying the emitted bytes to an emulator that holds frame A
    /// reproduces frame B, cell for cell.
    #[test]
    fn diff_fidelity_against_emulator() {
        let size = Size::new(12, 4);
        let mut compositor = Compositor::new(size, (10.0, 20.0));
        let mut emu = Emulator::new(size);

        let frame_a = render_text(
            &mut compositor,
            size,
            &[(0, 0, "hello 漢字"), (2, 2, "status: ok")],
        );
        emu.feed(&frame_a);

        let mut ctx = compositor.begin_frame(size, (10.0, 20.0));
        ctx.move_to(0, 0);
        ctx.set_style(Style {
            fg: Some(Color::Palette(2)),
            bg: None,
            flags: CellFlags::BOLD,
        });
        ctx.print("hullo 漢字");
        ctx.move_to(2, 3);
        ctx.set_style(Style::default());
        ctx.print("moved line");
        let frame_b = compositor.end_frame(CursorState::default());
        emu.feed(&frame_b);

        for y in 0..size.height {
            for x in 0..size.width {
                let want = compositor.current().cell(x, y).unwrap();
                let got = emu.grid().cell(x, y).unwrap();
                assert_eq!(want, got, "cell mismatch at ({x},{y})");
            }
        }
    }

    #[test]
    fn cursor_state_is_emitted_separately() {
        let size = Size::new(5, 2);
        let mut compositor = Compositor::new(size, (10.0, 20.0));
        let mut ctx = compositor.begin_frame(size, (10.0, 20.0));
        ctx.print("x");
        let bytes = compositor.end_frame(CursorState {
            pos: Pos::new(3, 1),
            visible: false,
            shape: CursorShape::SteadyBar,
        });
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.ends_with("\x1b[2;4H\x1b[?25l\x1b[6 q"), "got: {text:?}");
    }
}
