use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use cathode_common::types::{Cell, CellFlags, Color, CursorShape, Hyperlink, Size};
use cathode_parser::token::{
    ClearLineMode, ClearScreenMode, CursorDirection, StatusReport, Token,
};
use cathode_parser::{StreamDirection, Tokenizer};
use tracing::{debug, trace};

use super::grid::Grid;
use super::tracked::TrackedStore;
use crate::width::{grapheme_width, graphemes};

const TITLE_STACK_CAP: usize = 16;

/// Cursor state including the deferred-wrap flag: a write landing on the
/// effective right margin leaves the cursor there with `pending_wrap` set;
/// the next printable consumes the wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub x: u16,
    pub y: u16,
    pub pending_wrap: bool,
}

/// One cell write produced by applying a token.
#[derive(Debug, Clone, PartialEq)]
pub struct CellWrite {
    pub x: u16,
    pub y: u16,
    pub cell: Cell,
}

/// A token plus everything it did: the cell writes and the cursor change.
/// This is what impact-aware filters and presentations consume.
#[derive(Debug, Clone)]
pub struct AppliedToken {
    pub token: Token,
    pub writes: Vec<CellWrite>,
    pub cursor_before: Cursor,
    pub cursor_after: Cursor,
}

/// Side effects the host observes by draining, rather than by callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmulatorEvent {
    TitleChanged(String),
    IconNameChanged(String),
    ClipboardWrite { selection: String, data: String },
    Bell,
}

#[derive(Debug, Clone)]
pub struct EmulatorOptions {
    /// The presentation keeps its own main-screen buffer; alternate-screen
    /// transitions then clear or restore only the internal grid, without
    /// synthesizing cell impacts.
    pub handles_alternate_screen_natively: bool,
    /// Cell pixel metrics used to size Sixel images, kept floating; cells
    /// are derived with `ceil(px / cell_px)`.
    pub cell_px: (f32, f32),
}

impl Default for EmulatorOptions {
    fn default() -> Self {
        Self {
            handles_alternate_screen_natively: false,
            cell_px: (10.0, 20.0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Pen {
    fg: Option<Color>,
    bg: Option<Color>,
    flags: CellFlags,
}

#[derive(Debug)]
struct AltScreen {
    saved_grid: Grid,
    saved_cursor: Cursor,
}

/// The virtual terminal: applies tokens to a cell grid while maintaining
/// cursor, margins, scroll region, alternate screen, titles, and tracked
/// objects. Malformed input never fails; unknown tokens are ignored.
pub struct Emulator {
    grid: Grid,
    cursor: Cursor,
    pen: Pen,
    current_hyperlink: Option<Arc<Hyperlink>>,

    scroll_top: u16,
    scroll_bottom: u16,
    margin_left: u16,
    margin_right: u16,

    origin_mode: bool,
    newline_mode: bool,
    lr_margin_mode: bool,
    autowrap: bool,
    cursor_visible: bool,
    cursor_shape: CursorShape,
    private_modes: BTreeSet<u16>,

    alt: Option<AltScreen>,
    saved_cursor: Option<Cursor>,
    last_printed: Option<(Cell, u16)>,

    title: String,
    icon_name: String,
    title_stack: Vec<(String, String)>,

    write_seq: u64,
    tokenizer: Tokenizer,
    store: Arc<TrackedStore>,
    options: EmulatorOptions,

    responses: Vec<Vec<u8>>,
    events: Vec<EmulatorEvent>,
}

impl Emulator {
    pub fn new(size: Size) -> Self {
        Self::with_options(size, EmulatorOptions::default())
    }

    pub fn with_options(size: Size, options: EmulatorOptions) -> Self {
        let size = Size::new(size.width.max(1), size.height.max(1));
        Self {
            grid: Grid::new(size),
            cursor: Cursor::default(),
            pen: Pen::default(),
            current_hyperlink: None,
            scroll_top: 0,
            scroll_bottom: size.height - 1,
            margin_left: 0,
            margin_right: size.width - 1,
            origin_mode: false,
            newline_mode: false,
            lr_margin_mode: false,
            autowrap: true,
            cursor_visible: true,
            cursor_shape: CursorShape::Default,
            private_modes: BTreeSet::new(),
            alt: None,
            saved_cursor: None,
            last_printed: None,
            title: String::new(),
            icon_name: String::new(),
            title_stack: Vec::new(),
            write_seq: 0,
            tokenizer: Tokenizer::new(StreamDirection::Output),
            store: Arc::new(TrackedStore::new()),
            options,
            responses: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn size(&self) -> Size {
        self.grid.size()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn cursor_visible(&self) -> bool {
        self.cursor_visible
    }

    pub fn cursor_shape(&self) -> CursorShape {
        self.cursor_shape
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn icon_name(&self) -> &str {
        &self.icon_name
    }

    pub fn store(&self) -> &Arc<TrackedStore> {
        &self.store
    }

    pub fn alternate_screen_active(&self) -> bool {
        self.alt.is_some()
    }

    pub fn private_mode_enabled(&self, mode: u16) -> bool {
        self.private_modes.contains(&mode)
    }

    pub fn enabled_private_modes(&self) -> impl Iterator<Item = u16> + '_ {
        self.private_modes.iter().copied()
    }

    /// Queued replies (DSR) to be written back to the workload, in order.
    pub fn take_responses(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.responses)
    }

    pub fn take_events(&mut self) -> Vec<EmulatorEvent> {
        std::mem::take(&mut self.events)
    }

    /// Tokenize and apply raw output bytes; partial escape sequences carry
    /// over to the next call.
    pub fn feed(&mut self, bytes: &[u8]) {
        let tokens = self.tokenizer.advance(bytes);
        for token in tokens {
            self.apply(&token);
        }
    }

    /// Apply a token without observing its impacts.
    pub fn apply(&mut self, token: &Token) {
        let mut writes = Vec::new();
        self.apply_inner(token, &mut writes);
    }

    /// Apply a token and report every cell write plus the cursor change.
    pub fn apply_with_impacts(&mut self, token: Token) -> AppliedToken {
        let cursor_before = self.cursor;
        let mut writes = Vec::new();
        self.apply_inner(&token, &mut writes);
        AppliedToken {
            token,
            writes,
            cursor_before,
            cursor_after: self.cursor,
        }
    }

    fn effective_left(&self) -> u16 {
        if self.lr_margin_mode {
            self.margin_left
        } else {
            0
        }
    }

    fn effective_right(&self) -> u16 {
        if self.lr_margin_mode {
            self.margin_right
        } else {
            self.grid.width() - 1
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.write_seq += 1;
        self.write_seq
    }

    fn put(&mut self, x: u16, y: u16, cell: Cell, writes: &mut Vec<CellWrite>) {
        if self.grid.contains(x, y) {
            self.grid.set(x, y, cell.clone());
            writes.push(CellWrite { x, y, cell });
        }
    }

    #[allow(clippy::too_many_lines)]
    fn apply_inner(&mut self, token: &Token, writes: &mut Vec<CellWrite>) {
        trace!(?token, "apply");
        match token {
            Token::Text(text) => self.print_text(text, writes),
            Token::ControlChar(byte) => self.control_char(*byte, writes),
            Token::Sgr(params) => self.apply_sgr(params),
            Token::CursorPosition { row, col } => {
                self.cursor.pending_wrap = false;
                self.move_absolute(Some(*row), Some(*col));
            }
            Token::CursorMove { direction, count } => self.cursor_move(*direction, *count),
            Token::CursorColumn(col) => {
                self.cursor.pending_wrap = false;
                self.move_absolute(None, Some(*col));
            }
            Token::CursorRow(row) => {
                self.cursor.pending_wrap = false;
                self.move_absolute(Some(*row), None);
            }
            Token::ClearScreen(mode) => self.clear_screen(*mode, writes),
            Token::ClearLine(mode) => self.clear_line(*mode, writes),
            Token::ScrollUp(n) => self.scroll_region_up(*n, writes),
            Token::ScrollDown(n) => self.scroll_region_down(*n, writes),
            Token::InsertLines(n) => self.insert_lines(*n, writes),
            Token::DeleteLines(n) => self.delete_lines(*n, writes),
            Token::InsertCharacters(n) => self.insert_characters(*n, writes),
            Token::DeleteCharacters(n) => self.delete_characters(*n, writes),
            Token::EraseCharacters(n) => self.erase_characters(*n, writes),
            Token::RepeatCharacter(n) => self.repeat_character(*n, writes),
            Token::ScrollRegion { top, bottom } => self.set_scroll_region(*top, *bottom),
            Token::LeftRightMargin { left, right } => self.set_lr_margins(*left, *right),
            Token::SaveCursor => self.saved_cursor = Some(self.cursor),
            Token::RestoreCursor => {
                if let Some(saved) = self.saved_cursor {
                    self.cursor = saved;
                    self.clamp_cursor();
                }
            }
            Token::Index => self.index(writes),
            Token::ReverseIndex => self.reverse_index(writes),
            Token::Reset => self.reset(),
            Token::PrivateMode { mode, enable } => self.private_mode(*mode, *enable, writes),
            Token::CursorShape(shape) => self.cursor_shape = *shape,
            Token::CharacterSet { .. } | Token::KeypadMode(_) => {}
            Token::Osc {
                command,
                params,
                payload,
            } => self.osc(*command, params, payload),
            Token::Dcs(payload) => self.dcs(payload, writes),
            Token::DeviceStatusReport(kind) => self.device_status_report(*kind),
            // Input-direction tokens have no effect on the screen model.
            Token::SgrMouse { .. }
            | Token::Ss3(_)
            | Token::SpecialKey { .. }
            | Token::ArrowKey { .. }
            | Token::BackTab => {}
            Token::Unrecognized(raw) => {
                debug!(len = raw.len(), "ignoring unrecognized sequence");
            }
        }
        debug_assert!(self.cursor.x < self.grid.width() && self.cursor.y < self.grid.height());
    }

    // ------------------------------------------------------------------
    // Printing

    fn print_text(&mut self, text: &str, writes: &mut Vec<CellWrite>) {
        for cluster in graphemes(text) {
            let width = grapheme_width(cluster);
            if width == 0 {
                self.append_combining(cluster, writes);
                continue;
            }
            let template = self.pen_cell(cluster.to_string());
            self.print_cell(template, width, true, writes);
        }
    }

    fn pen_cell(&self, grapheme: String) -> Cell {
        Cell {
            grapheme,
            fg: self.pen.fg,
            bg: self.pen.bg,
            flags: self.pen.flags,
            write_seq: 0,
            written_at: Instant::now(),
            sixel: None,
            hyperlink: self.current_hyperlink.clone(),
        }
    }

    fn print_cell(
        &mut self,
        template: Cell,
        width: u16,
        record_last: bool,
        writes: &mut Vec<CellWrite>,
    ) {
        if self.cursor.pending_wrap {
            self.cursor.pending_wrap = false;
            self.wrap_line(writes);
        }
        let right = self.effective_right();
        if self.cursor.x + width - 1 > right {
            // A wide grapheme that no longer fits wraps early (or, with
            // autowrap off, is pushed left to stay inside the margin).
            if self.autowrap {
                self.wrap_line(writes);
            } else {
                self.cursor.x = right
                    .saturating_sub(width - 1)
                    .max(self.effective_left());
            }
        }

        let (x, y) = (self.cursor.x, self.cursor.y);
        for i in 0..width {
            self.clean_wide_neighbors(x + i, y, writes);
        }

        let seq = self.next_seq();
        let mut origin = template.clone();
        origin.write_seq = seq;
        self.put(x, y, origin, writes);
        for i in 1..width {
            let mut continuation = template.clone();
            continuation.grapheme = String::new();
            continuation.write_seq = seq;
            self.put(x + i, y, continuation, writes);
        }

        if record_last {
            // REP must not replicate tracked payloads.
            let mut stripped = template;
            stripped.hyperlink = None;
            stripped.sixel = None;
            stripped.flags.remove(CellFlags::SIXEL);
            self.last_printed = Some((stripped, width));
        }

        let next_x = x + width;
        if next_x > right {
            self.cursor.x = right;
            if self.autowrap {
                self.cursor.pending_wrap = true;
            }
        } else {
            self.cursor.x = next_x;
        }
    }

    /// Move to the next line's left margin, scrolling the region when the
    /// cursor sits on its bottom row.
    fn wrap_line(&mut self, writes: &mut Vec<CellWrite>) {
        self.cursor.x = self.effective_left();
        if self.cursor.y >= self.scroll_bottom {
            self.scroll_region_up(1, writes);
        } else {
            self.cursor.y += 1;
        }
    }

    /// A zero-width cluster attaches to the most recently written cell.
    fn append_combining(&mut self, cluster: &str, writes: &mut Vec<CellWrite>) {
        let mut x = if self.cursor.pending_wrap {
            self.cursor.x
        } else if self.cursor.x > 0 {
            self.cursor.x - 1
        } else {
            return;
        };
        let y = self.cursor.y;
        if self.grid.cell(x, y).is_some_and(Cell::is_continuation) && x > 0 {
            x -= 1;
        }
        if let Some(cell) = self.grid.cell_mut(x, y) {
            if !cell.is_continuation() {
                cell.grapheme.push_str(cluster);
                let cell = cell.clone();
                writes.push(CellWrite { x, y, cell });
            }
        }
    }

    /// Overwriting half of a wide grapheme orphans the other half; blank
    /// it to keep continuation cells adjacent to a live origin.
    fn clean_wide_neighbors(&mut self, x: u16, y: u16, writes: &mut Vec<CellWrite>) {
        let Some(cell) = self.grid.cell(x, y) else {
            return;
        };
        if cell.is_continuation() {
            if x > 0 {
                let origin_is_wide = self
                    .grid
                    .cell(x - 1, y)
                    .is_some_and(|c| !c.is_continuation());
                if origin_is_wide {
                    self.put(x - 1, y, Cell::blank(), writes);
                }
            }
        } else if grapheme_width(&cell.grapheme) > 1
            && self
                .grid
                .cell(x + 1, y)
                .is_some_and(Cell::is_continuation)
        {
            self.put(x + 1, y, Cell::blank(), writes);
        }
    }

    fn repeat_character(&mut self, n: u16, writes: &mut Vec<CellWrite>) {
        let Some((cell, width)) = self.last_printed.clone() else {
            return;
        };
        let cap = self.grid.size().area().min(u16::MAX as usize) as u16;
        let n = n.max(1).min(cap);
        for _ in 0..n {
            self.print_cell(cell.clone(), width, false, writes);
        }
    }

    // ------------------------------------------------------------------
    // Control characters

    fn control_char(&mut self, byte: u8, writes: &mut Vec<CellWrite>) {
        match byte {
            // LF, VT, and FF all line feed.
            0x0A | 0x0B | 0x0C => {
                self.cursor.pending_wrap = false;
                if self.newline_mode {
                    self.cursor.x = self.effective_left();
                }
                if self.cursor.y >= self.scroll_bottom {
                    self.scroll_region_up(1, writes);
                } else {
                    self.cursor.y += 1;
                }
            }
            0x0D => {
                self.cursor.pending_wrap = false;
                self.cursor.x = self.effective_left();
            }
            0x09 => {
                self.cursor.pending_wrap = false;
                self.cursor.x = ((self.cursor.x / 8 + 1) * 8).min(self.grid.width() - 1);
            }
            0x08 => {
                self.cursor.pending_wrap = false;
                if self.cursor.x > 0 {
                    self.cursor.x -= 1;
                }
            }
            0x07 => self.events.push(EmulatorEvent::Bell),
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Cursor movement

    fn cursor_move(&mut self, direction: CursorDirection, count: u16) {
        self.cursor.pending_wrap = false;
        let count = count.max(1);
        let (width, height) = (self.grid.width(), self.grid.height());
        match direction {
            CursorDirection::Up => self.cursor.y = self.cursor.y.saturating_sub(count),
            CursorDirection::Down => self.cursor.y = (self.cursor.y + count).min(height - 1),
            CursorDirection::Forward => self.cursor.x = (self.cursor.x + count).min(width - 1),
            CursorDirection::Back => self.cursor.x = self.cursor.x.saturating_sub(count),
            CursorDirection::NextLine => {
                self.cursor.x = self.effective_left();
                self.cursor.y = (self.cursor.y + count).min(height - 1);
            }
            CursorDirection::PreviousLine => {
                self.cursor.x = self.effective_left();
                self.cursor.y = self.cursor.y.saturating_sub(count);
            }
        }
    }

    /// Absolute positioning (CUP, CHA, VPA), 1-based wire values. Under
    /// origin mode coordinates are relative to the scroll region and the
    /// cursor is confined to it.
    fn move_absolute(&mut self, row: Option<u16>, col: Option<u16>) {
        if let Some(row) = row {
            let row = row.max(1) - 1;
            self.cursor.y = if self.origin_mode {
                (self.scroll_top + row).min(self.scroll_bottom)
            } else {
                row.min(self.grid.height() - 1)
            };
        }
        if let Some(col) = col {
            let col = col.max(1) - 1;
            self.cursor.x = if self.origin_mode && self.lr_margin_mode {
                (self.margin_left + col).min(self.margin_right)
            } else {
                col.min(self.grid.width() - 1)
            };
        }
    }

    fn index(&mut self, writes: &mut Vec<CellWrite>) {
        self.cursor.pending_wrap = false;
        if self.cursor.y >= self.scroll_bottom {
            self.scroll_region_up(1, writes);
        } else {
            self.cursor.y += 1;
        }
    }

    fn reverse_index(&mut self, writes: &mut Vec<CellWrite>) {
        self.cursor.pending_wrap = false;
        if self.cursor.y <= self.scroll_top {
            self.scroll_region_down(1, writes);
        } else {
            self.cursor.y -= 1;
        }
    }

    fn clamp_cursor(&mut self) {
        self.cursor.x = self.cursor.x.min(self.grid.width() - 1);
        self.cursor.y = self.cursor.y.min(self.grid.height() - 1);
    }

    // ------------------------------------------------------------------
    // Clearing

    fn clear_screen(&mut self, mode: ClearScreenMode, writes: &mut Vec<CellWrite>) {
        let (width, height) = (self.grid.width(), self.grid.height());
        let (x, y) = (self.cursor.x, self.cursor.y);
        match mode {
            ClearScreenMode::ToEnd => {
                self.blank_row_span(y, x, width - 1, writes);
                for row in y + 1..height {
                    self.blank_row_span(row, 0, width - 1, writes);
                }
            }
            ClearScreenMode::ToStart => {
                for row in 0..y {
                    self.blank_row_span(row, 0, width - 1, writes);
                }
                self.blank_row_span(y, 0, x, writes);
            }
            // No scrollback exists; both full clears are identical.
            ClearScreenMode::All | ClearScreenMode::AllAndScrollback => {
                for row in 0..height {
                    self.blank_row_span(row, 0, width - 1, writes);
                }
            }
        }
    }

    fn clear_line(&mut self, mode: ClearLineMode, writes: &mut Vec<CellWrite>) {
        let y = self.cursor.y;
        let x = self.cursor.x;
        let (left, right) = if self.lr_margin_mode {
            (self.margin_left, self.margin_right)
        } else {
            (0, self.grid.width() - 1)
        };
        match mode {
            ClearLineMode::ToEnd => self.blank_row_span(y, x.max(left), right, writes),
            ClearLineMode::ToStart => self.blank_row_span(y, left, x.min(right), writes),
            ClearLineMode::All => self.blank_row_span(y, left, right, writes),
        }
    }

    fn blank_row_span(&mut self, y: u16, from: u16, to: u16, writes: &mut Vec<CellWrite>) {
        for x in from..=to {
            self.put(x, y, Cell::blank(), writes);
        }
    }

    fn erase_characters(&mut self, n: u16, writes: &mut Vec<CellWrite>) {
        let n = n.max(1);
        let right = self.effective_right();
        if self.lr_margin_mode
            && (self.cursor.x < self.margin_left || self.cursor.x > self.margin_right)
        {
            return;
        }
        let to = (self.cursor.x + n - 1).min(right);
        self.blank_row_span(self.cursor.y, self.cursor.x, to, writes);
    }

    // ------------------------------------------------------------------
    // Scroll region operations

    fn region_columns(&self) -> (u16, u16) {
        (self.effective_left(), self.effective_right())
    }

    fn scroll_region_up(&mut self, n: u16, writes: &mut Vec<CellWrite>) {
        let n = n.max(1).min(self.scroll_bottom - self.scroll_top + 1);
        let (left, right) = self.region_columns();
        for y in self.scroll_top..=self.scroll_bottom {
            for x in left..=right {
                let src_y = y + n;
                let cell = if src_y <= self.scroll_bottom {
                    self.grid.cell(x, src_y).cloned().unwrap_or_default()
                } else {
                    Cell::blank()
                };
                self.put(x, y, cell, writes);
            }
        }
    }

    fn scroll_region_down(&mut self, n: u16, writes: &mut Vec<CellWrite>) {
        let n = n.max(1).min(self.scroll_bottom - self.scroll_top + 1);
        let (left, right) = self.region_columns();
        for y in (self.scroll_top..=self.scroll_bottom).rev() {
            for x in left..=right {
                let cell = if y >= self.scroll_top + n {
                    self.grid.cell(x, y - n).cloned().unwrap_or_default()
                } else {
                    Cell::blank()
                };
                self.put(x, y, cell, writes);
            }
        }
    }

    fn insert_lines(&mut self, n: u16, writes: &mut Vec<CellWrite>) {
        let y = self.cursor.y;
        if y < self.scroll_top || y > self.scroll_bottom {
            return;
        }
        let n = n.max(1).min(self.scroll_bottom - y + 1);
        let (left, right) = self.region_columns();
        for row in (y..=self.scroll_bottom).rev() {
            for x in left..=right {
                let cell = if row >= y + n {
                    self.grid.cell(x, row - n).cloned().unwrap_or_default()
                } else {
                    Cell::blank()
                };
                self.put(x, row, cell, writes);
            }
        }
    }

    fn delete_lines(&mut self, n: u16, writes: &mut Vec<CellWrite>) {
        let y = self.cursor.y;
        if y < self.scroll_top || y > self.scroll_bottom {
            return;
        }
        let n = n.max(1).min(self.scroll_bottom - y + 1);
        let (left, right) = self.region_columns();
        for row in y..=self.scroll_bottom {
            for x in left..=right {
                let src = row + n;
                let cell = if src <= self.scroll_bottom {
                    self.grid.cell(x, src).cloned().unwrap_or_default()
                } else {
                    Cell::blank()
                };
                self.put(x, row, cell, writes);
            }
        }
    }

    fn insert_characters(&mut self, n: u16, writes: &mut Vec<CellWrite>) {
        let (left, right) = self.region_columns();
        let (x, y) = (self.cursor.x, self.cursor.y);
        if x < left || x > right {
            return;
        }
        let n = n.max(1).min(right - x + 1);
        for col in (x..=right).rev() {
            let cell = if col >= x + n {
                self.grid.cell(col - n, y).cloned().unwrap_or_default()
            } else {
                Cell::blank()
            };
            self.put(col, y, cell, writes);
        }
    }

    fn delete_characters(&mut self, n: u16, writes: &mut Vec<CellWrite>) {
        let (left, right) = self.region_columns();
        let (x, y) = (self.cursor.x, self.cursor.y);
        if x < left || x > right {
            return;
        }
        let n = n.max(1).min(right - x + 1);
        for col in x..=right {
            let src = col + n;
            let cell = if src <= right {
                self.grid.cell(src, y).cloned().unwrap_or_default()
            } else {
                Cell::blank()
            };
            self.put(col, y, cell, writes);
        }
    }

    fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let height = self.grid.height();
        let top = top.max(1) - 1;
        let bottom = if bottom == 0 { height - 1 } else { (bottom - 1).min(height - 1) };
        if top >= bottom {
            return;
        }
        self.scroll_top = top;
        self.scroll_bottom = bottom;
        self.cursor.pending_wrap = false;
        self.home_cursor();
    }

    fn set_lr_margins(&mut self, left: u16, right: u16) {
        if !self.lr_margin_mode {
            return;
        }
        let width = self.grid.width();
        let left = left.max(1) - 1;
        let right = if right == 0 { width - 1 } else { (right - 1).min(width - 1) };
        if left >= right {
            return;
        }
        self.margin_left = left;
        self.margin_right = right;
        self.cursor.pending_wrap = false;
        self.home_cursor();
    }

    fn home_cursor(&mut self) {
        if self.origin_mode {
            self.cursor.x = self.effective_left();
            self.cursor.y = self.scroll_top;
        } else {
            self.cursor.x = 0;
            self.cursor.y = 0;
        }
    }

    // ------------------------------------------------------------------
    // Modes

    fn private_mode(&mut self, mode: u16, enable: bool, writes: &mut Vec<CellWrite>) {
        if enable {
            self.private_modes.insert(mode);
        } else {
            self.private_modes.remove(&mode);
        }
        match mode {
            6 => {
                self.origin_mode = enable;
                self.cursor.pending_wrap = false;
                self.home_cursor();
            }
            7 => {
                self.autowrap = enable;
                if !enable {
                    self.cursor.pending_wrap = false;
                }
            }
            20 => self.newline_mode = enable,
            25 => self.cursor_visible = enable,
            69 => {
                self.lr_margin_mode = enable;
                if !enable {
                    self.margin_left = 0;
                    self.margin_right = self.grid.width() - 1;
                }
            }
            1049 => {
                if enable {
                    self.enter_alternate_screen(writes);
                } else {
                    self.exit_alternate_screen(writes);
                }
            }
            _ => {}
        }
    }

    fn enter_alternate_screen(&mut self, writes: &mut Vec<CellWrite>) {
        if self.alt.is_some() {
            return;
        }
        self.alt = Some(AltScreen {
            saved_grid: self.grid.clone(),
            saved_cursor: self.cursor,
        });
        if self.options.handles_alternate_screen_natively {
            self.grid.clear();
        } else {
            let (width, height) = (self.grid.width(), self.grid.height());
            for y in 0..height {
                self.blank_row_span(y, 0, width - 1, writes);
            }
        }
    }

    /// Unbalanced exits are ignored.
    fn exit_alternate_screen(&mut self, writes: &mut Vec<CellWrite>) {
        let Some(alt) = self.alt.take() else {
            return;
        };
        self.grid = alt.saved_grid;
        if !self.options.handles_alternate_screen_natively {
            for y in 0..self.grid.height() {
                for x in 0..self.grid.width() {
                    if let Some(cell) = self.grid.cell(x, y) {
                        let cell = cell.clone();
                        writes.push(CellWrite { x, y, cell });
                    }
                }
            }
        }
        self.cursor = alt.saved_cursor;
        self.clamp_cursor();
    }

    // ------------------------------------------------------------------
    // SGR

    fn apply_sgr(&mut self, params: &[u16]) {
        if params.is_empty() {
            self.pen = Pen::default();
            return;
        }
        let mut i = 0;
        while i < params.len() {
            match params[i] {
                0 => self.pen = Pen::default(),
                1 => self.pen.flags.insert(CellFlags::BOLD),
                2 => self.pen.flags.insert(CellFlags::DIM),
                3 => self.pen.flags.insert(CellFlags::ITALIC),
                4 => self.pen.flags.insert(CellFlags::UNDERLINE),
                5 | 6 => self.pen.flags.insert(CellFlags::BLINK),
                7 => self.pen.flags.insert(CellFlags::REVERSE),
                8 => self.pen.flags.insert(CellFlags::HIDDEN),
                9 => self.pen.flags.insert(CellFlags::STRIKETHROUGH),
                21 | 22 => {
                    self.pen.flags.remove(CellFlags::BOLD);
                    self.pen.flags.remove(CellFlags::DIM);
                }
                23 => self.pen.flags.remove(CellFlags::ITALIC),
                24 => self.pen.flags.remove(CellFlags::UNDERLINE),
                25 => self.pen.flags.remove(CellFlags::BLINK),
                27 => self.pen.flags.remove(CellFlags::REVERSE),
                28 => self.pen.flags.remove(CellFlags::HIDDEN),
                29 => self.pen.flags.remove(CellFlags::STRIKETHROUGH),
                53 => self.pen.flags.insert(CellFlags::OVERLINE),
                55 => self.pen.flags.remove(CellFlags::OVERLINE),
                30..=37 => self.pen.fg = Some(Color::Palette((params[i] - 30) as u8)),
                90..=97 => self.pen.fg = Some(Color::Palette((params[i] - 90 + 8) as u8)),
                40..=47 => self.pen.bg = Some(Color::Palette((params[i] - 40) as u8)),
                100..=107 => self.pen.bg = Some(Color::Palette((params[i] - 100 + 8) as u8)),
                39 => self.pen.fg = None,
                49 => self.pen.bg = None,
                38 | 48 => {
                    let (color, consumed) = parse_extended_color(&params[i + 1..]);
                    if params[i] == 38 {
                        self.pen.fg = color;
                    } else {
                        self.pen.bg = color;
                    }
                    i += consumed;
                }
                other => trace!(other, "unhandled SGR parameter"),
            }
            i += 1;
        }
    }

    // ------------------------------------------------------------------
    // OSC / DCS / DSR

    fn osc(&mut self, command: u16, params: &str, payload: &str) {
        match command {
            0 => {
                self.set_title(payload);
                self.set_icon_name(payload);
            }
            1 => self.set_icon_name(payload),
            2 => self.set_title(payload),
            8 => {
                if payload.is_empty() {
                    self.current_hyperlink = None;
                } else {
                    let id = params
                        .split(':')
                        .find_map(|p| p.strip_prefix("id="))
                        .map(str::to_string);
                    self.current_hyperlink =
                        Some(self.store.intern_hyperlink(payload.to_string(), id));
                }
            }
            22 => {
                if self.title_stack.len() == TITLE_STACK_CAP {
                    self.title_stack.remove(0);
                }
                self.title_stack
                    .push((self.title.clone(), self.icon_name.clone()));
                if !payload.is_empty() {
                    self.set_title(payload);
                }
            }
            23 => {
                if let Some((title, icon)) = self.title_stack.pop() {
                    self.set_title(&title);
                    self.set_icon_name(&icon);
                }
            }
            52 => self.events.push(EmulatorEvent::ClipboardWrite {
                selection: params.to_string(),
                data: payload.to_string(),
            }),
            _ => {}
        }
    }

    fn set_title(&mut self, title: &str) {
        if self.title != title {
            self.title = title.to_string();
            self.events
                .push(EmulatorEvent::TitleChanged(self.title.clone()));
        }
    }

    fn set_icon_name(&mut self, icon: &str) {
        if self.icon_name != icon {
            self.icon_name = icon.to_string();
            self.events
                .push(EmulatorEvent::IconNameChanged(self.icon_name.clone()));
        }
    }

    /// A DCS whose body is `[params] q …` is Sixel image data; everything
    /// else is ignored. The image payload is interned whole; the cell
    /// under the cursor holds the reference, covered cells only carry the
    /// attribute bit.
    fn dcs(&mut self, payload: &[u8], writes: &mut Vec<CellWrite>) {
        let mut idx = 0;
        while idx < payload.len() && (payload[idx].is_ascii_digit() || payload[idx] == b';') {
            idx += 1;
        }
        if payload.get(idx) != Some(&b'q') {
            return;
        }

        let (width_cells, height_cells) = self.sixel_cell_extent(&payload[idx + 1..]);
        let image = self
            .store
            .intern_sixel(payload.to_vec(), width_cells, height_cells);

        let (cx, cy) = (self.cursor.x, self.cursor.y);
        for dy in 0..height_cells {
            for dx in 0..width_cells {
                let (x, y) = (cx + dx, cy + dy);
                let Some(existing) = self.grid.cell(x, y) else {
                    continue;
                };
                let mut cell = existing.clone();
                cell.flags.insert(CellFlags::SIXEL);
                if dx == 0 && dy == 0 {
                    cell.sixel = Some(Arc::clone(&image));
                }
                self.put(x, y, cell, writes);
            }
        }
    }

    /// Cell extent estimated from the raster-attributes command
    /// (`"Pan;Pad;Ph;Pv`), using the floating cell pixel metrics and
    /// `ceil`, clamped to the grid.
    fn sixel_cell_extent(&self, body: &[u8]) -> (u16, u16) {
        let mut px = (0u32, 0u32);
        if body.first() == Some(&b'"') {
            let nums: Vec<u32> = body[1..]
                .iter()
                .take_while(|b| b.is_ascii_digit() || **b == b';')
                .collect::<Vec<_>>()
                .split(|b| **b == b';')
                .map(|digits| {
                    digits
                        .iter()
                        .fold(0u32, |acc, &&b| acc.saturating_mul(10) + (b - b'0') as u32)
                })
                .collect();
            if nums.len() >= 4 {
                px = (nums[2], nums[3]);
            }
        }
        let (cell_w, cell_h) = self.options.cell_px;
        let width = ((px.0 as f32 / cell_w).ceil() as u16).clamp(1, self.grid.width());
        let height = ((px.1 as f32 / cell_h).ceil() as u16).clamp(1, self.grid.height());
        (width, height)
    }

    fn device_status_report(&mut self, kind: StatusReport) {
        let reply = match kind {
            StatusReport::Status => b"\x1b[0n".to_vec(),
            StatusReport::CursorPosition => {
                format!("\x1b[{};{}R", self.cursor.y + 1, self.cursor.x + 1).into_bytes()
            }
        };
        self.responses.push(reply);
    }

    // ------------------------------------------------------------------
    // Whole-terminal operations

    /// RIS. Everything resets except the window title and icon.
    fn reset(&mut self) {
        let size = self.grid.size();
        self.grid = Grid::new(size);
        self.cursor = Cursor::default();
        self.pen = Pen::default();
        self.current_hyperlink = None;
        self.scroll_top = 0;
        self.scroll_bottom = size.height - 1;
        self.margin_left = 0;
        self.margin_right = size.width - 1;
        self.origin_mode = false;
        self.newline_mode = false;
        self.lr_margin_mode = false;
        self.autowrap = true;
        self.cursor_visible = true;
        self.cursor_shape = CursorShape::Default;
        self.private_modes.clear();
        self.alt = None;
        self.saved_cursor = None;
        self.last_printed = None;
    }

    /// Adopt new cell pixel metrics (e.g. from a presentation resize
    /// notification); affects subsequent Sixel cell-extent estimates.
    pub fn set_cell_metrics(&mut self, cell_px: (f32, f32)) {
        if cell_px.0 > 0.0 && cell_px.1 > 0.0 {
            self.options.cell_px = cell_px;
        }
    }

    /// Resize preserving the top-left intersection; margins and the
    /// scroll region reset to the full screen and the cursor is clamped.
    pub fn resize(&mut self, new_size: Size) {
        let new_size = Size::new(new_size.width.max(1), new_size.height.max(1));
        if new_size == self.grid.size() {
            return;
        }
        self.grid.resize(new_size);
        if let Some(alt) = &mut self.alt {
            alt.saved_grid.resize(new_size);
            alt.saved_cursor.x = alt.saved_cursor.x.min(new_size.width - 1);
            alt.saved_cursor.y = alt.saved_cursor.y.min(new_size.height - 1);
        }
        self.scroll_top = 0;
        self.scroll_bottom = new_size.height - 1;
        self.margin_left = 0;
        self.margin_right = new_size.width - 1;
        self.cursor.pending_wrap = false;
        self.clamp_cursor();
    }
}

fn parse_extended_color(rest: &[u16]) -> (Option<Color>, usize) {
    match rest.first() {
        Some(5) if rest.len() >= 2 => (Some(Color::Indexed(rest[1].min(255) as u8)), 2),
        Some(2) if rest.len() >= 4 => (
            Some(Color::Rgb(
                rest[1].min(255) as u8,
                rest[2].min(255) as u8,
                rest[3].min(255) as u8,
            )),
            4,
        ),
        _ => (None, rest.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cathode_common::types::Size;

    fn emulator(width: u16, height: u16) -> Emulator {
        Emulator::new(Size::new(width, height))
    }

    #[test]
    fn plain_write_and_newline() {
        let mut emu = emulator(5, 2);
        emu.feed(b"abc\r\nXY");
        assert_eq!(emu.grid().row_text(0), "abc  ");
        assert_eq!(emu.grid().row_text(1), "XY   ");
        assert_eq!(emu.cursor(), Cursor { x: 2, y: 1, pending_wrap: false });
    }

    #[test]
    fn clear_and_position() {
        let mut emu = emulator(5, 5);
        emu.feed(b"\x1b[2J\x1b[3;1Hhello");
        for y in [0, 1, 3, 4] {
            assert_eq!(emu.grid().row_text(y), "     ");
        }
        assert_eq!(emu.grid().row_text(2), "hello");
        assert_eq!(emu.cursor(), Cursor { x: 4, y: 2, pending_wrap: true });
    }

    #[test]
    fn overstrike_after_cursor_back() {
        let mut emu = emulator(5, 1);
        emu.feed(b"AAAAA\x1b[4DBB");
        assert_eq!(emu.grid().row_text(0), "ABBAA");
        assert_eq!(emu.cursor(), Cursor { x: 3, y: 0, pending_wrap: false });
    }

    #[test]
    fn deferred_wrap_sequence() {
        let mut emu = emulator(5, 2);
        emu.feed(b"abcde");
        assert_eq!(emu.cursor(), Cursor { x: 4, y: 0, pending_wrap: true });

        // CR consumes nothing but clears the flag.
        emu.feed(b"\r");
        assert_eq!(emu.cursor(), Cursor { x: 0, y: 0, pending_wrap: false });

        emu.feed(b"abcde");
        assert!(emu.cursor().pending_wrap);
        emu.feed(b"f");
        assert_eq!(emu.cursor(), Cursor { x: 1, y: 1, pending_wrap: false });
        assert_eq!(emu.grid().row_text(1), "f    ");
    }

    #[test]
    fn wide_character_atomicity() {
        let mut emu = emulator(6, 1);
        emu.feed("漢b".as_bytes());
        let origin = emu.grid().cell(0, 0).unwrap().clone();
        let cont = emu.grid().cell(1, 0).unwrap().clone();
        assert_eq!(origin.grapheme, "漢");
        assert!(cont.is_continuation());
        assert_eq!(origin.write_seq, cont.write_seq);
        assert_eq!(emu.grid().cell(2, 0).unwrap().grapheme, "b");
    }

    #[test]
    fn overwriting_half_a_wide_char_blanks_the_other_half() {
        let mut emu = emulator(6, 1);
        emu.feed("漢".as_bytes());
        emu.feed(b"\x1b[1;2Hx");
        assert_eq!(emu.grid().cell(0, 0).unwrap().grapheme, " ");
        assert_eq!(emu.grid().cell(1, 0).unwrap().grapheme, "x");
    }

    #[test]
    fn combining_mark_attaches_to_previous_cell() {
        let mut emu = emulator(5, 1);
        emu.feed(b"e");
        emu.feed("\u{0301}".as_bytes());
        assert_eq!(emu.grid().cell(0, 0).unwrap().grapheme, "e\u{0301}");
        assert_eq!(emu.cursor().x, 1);
    }

    #[test]
    fn scroll_region_preserves_rows_outside() {
        let mut emu = emulator(4, 5);
        emu.feed(b"r0\r\nr1\r\nr2\r\nr3\r\nr4");
        emu.feed(b"\x1b[2;4r\x1b[2;1H\n\n\n\n");
        // Rows outside the region keep their content.
        assert_eq!(emu.grid().row_text(0), "r0  ");
        assert_eq!(emu.grid().row_text(4), "r4  ");
        // Two line feeds walked to the bottom margin, two scrolled.
        assert_eq!(emu.grid().row_text(1), "r3  ");
        assert_eq!(emu.grid().row_text(2), "    ");
        assert_eq!(emu.grid().row_text(3), "    ");
    }

    #[test]
    fn scroll_up_preserves_surviving_rows() {
        let mut emu = emulator(4, 6);
        emu.feed(b"r0\r\nr1\r\nr2\r\nr3\r\nr4\r\nr5");
        emu.feed(b"\x1b[2;5r\x1b[2S");
        assert_eq!(emu.grid().row_text(1), "r3  ");
        assert_eq!(emu.grid().row_text(2), "r4  ");
        assert_eq!(emu.grid().row_text(3), "    ");
        assert_eq!(emu.grid().row_text(4), "    ");
        assert_eq!(emu.grid().row_text(0), "r0  ");
        assert_eq!(emu.grid().row_text(5), "r5  ");
    }

    #[test]
    fn alternate_screen_round_trip() {
        let mut emu = emulator(5, 2);
        emu.feed(b"hello");
        let cursor_before = emu.cursor();
        assert!(cursor_before.pending_wrap);

        emu.feed(b"\x1b[?1049h");
        assert!(emu.alternate_screen_active());
        assert_eq!(emu.grid().row_text(0), "     ");
        emu.feed(b"X");

        emu.feed(b"\x1b[?1049l");
        assert!(!emu.alternate_screen_active());
        assert_eq!(emu.grid().row_text(0), "hello");
        assert_eq!(emu.cursor(), cursor_before);
    }

    #[test]
    fn unbalanced_alt_exit_is_ignored() {
        let mut emu = emulator(5, 2);
        emu.feed(b"hi");
        emu.feed(b"\x1b[?1049l");
        assert_eq!(emu.grid().row_text(0), "hi   ");
        assert_eq!(emu.cursor().x, 2);

        emu.feed(b"\x1b[?1049h\x1b[?1049h");
        assert!(emu.alternate_screen_active());
        emu.feed(b"\x1b[?1049l");
        assert!(!emu.alternate_screen_active());
    }

    #[test]
    fn hyperlink_ref_counting() {
        let mut emu = emulator(10, 2);
        emu.feed(b"\x1b]8;id=42;https://ex\x07link\x1b]8;;\x07");
        let link = emu.grid().cell(0, 0).unwrap().hyperlink.clone().unwrap();
        assert_eq!(link.uri, "https://ex");
        assert_eq!(link.id.as_deref(), Some("42"));
        // Four cells hold the only references.
        assert_eq!(Arc::strong_count(&link), 5);
        for x in 0..4 {
            assert!(emu.grid().cell(x, 0).unwrap().hyperlink.is_some());
        }
        assert!(emu.grid().cell(4, 0).is_some_and(|c| c.hyperlink.is_none()));

        emu.feed(b"next");
        assert!(emu.grid().cell(4, 0).unwrap().hyperlink.is_none());

        // Clearing the buffer releases everything.
        emu.feed(b"\x1b[2J");
        drop(link);
        assert_eq!(emu.store().live_objects(), 0);
    }

    #[test]
    fn rep_repeats_without_tracked_refs() {
        let mut emu = emulator(8, 1);
        emu.feed(b"\x1b]8;;https://ex\x07a\x1b[3b");
        assert_eq!(emu.grid().row_text(0), "aaaa    ");
        assert!(emu.grid().cell(0, 0).unwrap().hyperlink.is_some());
        for x in 1..4 {
            assert!(
                emu.grid().cell(x, 0).unwrap().hyperlink.is_none(),
                "REP must not clone hyperlink refs"
            );
        }
    }

    #[test]
    fn rep_rewraps_per_repetition() {
        let mut emu = emulator(3, 2);
        emu.feed(b"ab\x1b[3b");
        assert_eq!(emu.grid().row_text(0), "abb");
        assert_eq!(emu.grid().row_text(1), "bb ");
    }

    #[test]
    fn dsr_replies_are_queued() {
        let mut emu = emulator(10, 5);
        emu.feed(b"\x1b[3;4H\x1b[6n\x1b[5n");
        let responses = emu.take_responses();
        assert_eq!(responses, vec![b"\x1b[3;4R".to_vec(), b"\x1b[0n".to_vec()]);
        assert!(emu.take_responses().is_empty());
    }

    #[test]
    fn titles_and_title_stack() {
        let mut emu = emulator(5, 2);
        emu.feed(b"\x1b]0;first\x07");
        assert_eq!(emu.title(), "first");
        assert_eq!(emu.icon_name(), "first");

        emu.feed(b"\x1b]22;second\x07");
        assert_eq!(emu.title(), "second");
        emu.feed(b"\x1b]23;\x07");
        assert_eq!(emu.title(), "first");

        let events = emu.take_events();
        assert!(events.contains(&EmulatorEvent::TitleChanged("second".into())));
    }

    #[test]
    fn origin_mode_confines_cursor() {
        let mut emu = emulator(10, 10);
        emu.feed(b"\x1b[3;6r\x1b[?6h");
        assert_eq!(emu.cursor().y, 2);
        emu.feed(b"\x1b[1;1H");
        assert_eq!(emu.cursor(), Cursor { x: 0, y: 2, pending_wrap: false });
        emu.feed(b"\x1b[99;1H");
        assert_eq!(emu.cursor().y, 5);
    }

    #[test]
    fn left_right_margins_bound_wrap_and_clear() {
        let mut emu = emulator(10, 3);
        emu.feed(b"\x1b[?69h\x1b[3;6s");
        emu.feed(b"\x1b[1;3H");
        emu.feed(b"abcdef");
        // Wrap stays inside columns 3..=6 (1-based).
        assert_eq!(emu.grid().row_text(0), "  abcd    ");
        assert_eq!(emu.grid().row_text(1), "  ef      ");

        emu.feed(b"\x1b[2;4H\x1b[2K");
        assert_eq!(emu.grid().row_text(1), "          ");
    }

    #[test]
    fn erase_and_shift_characters() {
        let mut emu = emulator(6, 1);
        emu.feed(b"abcdef\x1b[1;2H\x1b[2P");
        assert_eq!(emu.grid().row_text(0), "adef  ");
        emu.feed(b"\x1b[2@");
        assert_eq!(emu.grid().row_text(0), "a  def");
        emu.feed(b"\x1b[1;1H\x1b[2X");
        assert_eq!(emu.grid().row_text(0), "   def");
    }

    #[test]
    fn resize_preserves_intersection_and_resets_regions() {
        let mut emu = emulator(6, 4);
        emu.feed(b"top\x1b[2;3r");
        emu.resize(Size::new(4, 3));
        assert_eq!(emu.grid().row_text(0), "top ");
        // Region reset to full height: an Index at the last row scrolls.
        emu.feed(b"\x1b[3;1Hbottom-row");
        assert_eq!(emu.cursor().y, 2);
    }

    #[test]
    fn sixel_dcs_produces_tracked_image() {
        let mut emu = emulator(10, 6);
        // 30x40 px at 10x20 px cells => 3x2 cells.
        emu.feed(b"\x1bP0;0;0q\"1;1;30;40#0~~\x1b\\");
        let origin = emu.grid().cell(0, 0).unwrap();
        let image = origin.sixel.clone().expect("origin holds the ref");
        assert_eq!((image.width_cells, image.height_cells), (3, 2));
        assert!(origin.flags.contains(CellFlags::SIXEL));
        // Covered cells carry the bit but not the reference.
        let covered = emu.grid().cell(2, 1).unwrap();
        assert!(covered.flags.contains(CellFlags::SIXEL));
        assert!(covered.sixel.is_none());
        assert_eq!(Arc::strong_count(&image), 2);
    }

    #[test]
    fn cursor_stays_in_bounds_for_arbitrary_moves() {
        let mut emu = emulator(4, 3);
        emu.feed(b"\x1b[99;99H\x1b[50C\x1b[50B");
        let c = emu.cursor();
        assert!(c.x < 4 && c.y < 3);
        emu.feed(b"\x1b[99A\x1b[99D");
        let c = emu.cursor();
        assert_eq!((c.x, c.y), (0, 0));
    }

    #[test]
    fn impacts_report_writes_and_cursor() {
        let mut emu = emulator(5, 2);
        let applied = emu.apply_with_impacts(Token::Text("hi".into()));
        assert_eq!(applied.writes.len(), 2);
        assert_eq!(applied.cursor_before, Cursor::default());
        assert_eq!(applied.cursor_after.x, 2);
        assert_eq!(applied.writes[0].cell.grapheme, "h");
        assert_eq!(applied.writes[1].x, 1);
    }

    #[test]
    fn malformed_input_never_panics() {
        let mut emu = emulator(4, 2);
        emu.feed(b"\x1b[;;;H\x1b[99999999b\x1b[?xyz\x07\xFF\xFE");
        emu.feed(b"\x1b[0;0r\x1b[5;1r\x1b[]");
        let c = emu.cursor();
        assert!(c.x < 4 && c.y < 2);
    }
}
