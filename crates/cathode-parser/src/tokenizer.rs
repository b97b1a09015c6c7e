use cathode_common::input::{KeyCode, Modifiers, MouseAction, MouseButton};
use cathode_common::types::CursorShape;
use tracing::trace;

use crate::token::{
    ArrowDirection, Charset, CharsetSlot, ClearLineMode, ClearScreenMode, CursorDirection,
    KeypadMode, StatusReport, Token,
};

const ESC: u8 = 0x1B;
const BEL: u8 = 0x07;
const DEL: u8 = 0x7F;

/// Which side of the wire a tokenizer is reading. The byte grammar is the
/// same; a handful of CSI finals mean different things (`CSI A` is a cursor
/// move in application output but an arrow key from a terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    /// Application → terminal: drawing commands.
    Output,
    /// Terminal → application: keys and mouse reports.
    Input,
}

enum Scan {
    /// Tokens produced, next index to resume from.
    Tokens(Vec<Token>, usize),
    /// The sequence runs past the end of the chunk; buffer and retry.
    Incomplete,
}

/// Incremental escape-sequence tokenizer.
///
/// `advance` consumes the longest prefix of the accumulated bytes whose last
/// byte closes a token; a trailing partial escape sequence or partial UTF-8
/// scalar is carried over to the next call. Unknown sequences come back as
/// [`Token::Unrecognized`]; no input is ever a hard error.
pub struct Tokenizer {
    direction: StreamDirection,
    pending: Vec<u8>,
}

impl Tokenizer {
    pub fn new(direction: StreamDirection) -> Self {
        Self {
            direction,
            pending: Vec::new(),
        }
    }

    /// Bytes held back from the previous chunk (incomplete escape or
    /// UTF-8 tail).
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Drain the carry-over buffer, classifying whatever is in it. Used at
    /// stream end where no continuation can arrive.
    pub fn finish(&mut self) -> Vec<Token> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.pending);
        if rest[0] == ESC {
            vec![Token::Unrecognized(rest)]
        } else {
            vec![Token::Text(String::from_utf8_lossy(&rest).into_owned())]
        }
    }

    pub fn advance(&mut self, chunk: &[u8]) -> Vec<Token> {
        let mut work = std::mem::take(&mut self.pending);
        work.extend_from_slice(chunk);

        let mut tokens = Vec::new();
        let mut i = 0;
        while i < work.len() {
            let b = work[i];
            if b == ESC {
                match self.scan_escape(&work, i) {
                    Scan::Tokens(mut produced, next) => {
                        tokens.append(&mut produced);
                        i = next;
                    }
                    Scan::Incomplete => {
                        self.pending = work[i..].to_vec();
                        return tokens;
                    }
                }
            } else if b < 0x20 || b == DEL {
                tokens.push(Token::ControlChar(b));
                i += 1;
            } else {
                let start = i;
                while i < work.len() && work[i] >= 0x20 && work[i] != DEL && work[i] != ESC {
                    i += 1;
                }
                let at_end = i == work.len();
                self.emit_text(&work[start..i], at_end, &mut tokens);
            }
        }
        tokens
    }

    /// Turn a run of non-control bytes into `Text`, holding back an
    /// incomplete trailing UTF-8 scalar when the run ends the chunk.
    fn emit_text(&mut self, run: &[u8], at_end: bool, tokens: &mut Vec<Token>) {
        let mut out = String::new();
        let mut rest = run;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(err) => {
                    let (valid, bad) = rest.split_at(err.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        // Truncated scalar at the end of the chunk: carry it.
                        None if at_end => {
                            self.pending = bad.to_vec();
                            break;
                        }
                        None => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            break;
                        }
                        Some(n) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &bad[n..];
                        }
                    }
                }
            }
        }
        if !out.is_empty() {
            tokens.push(Token::Text(out));
        }
    }

    fn scan_escape(&self, work: &[u8], i: usize) -> Scan {
        let len = work.len();
        if i + 1 >= len {
            return Scan::Incomplete;
        }
        match work[i + 1] {
            b'[' => self.scan_csi(work, i),
            b']' => self.scan_osc(work, i),
            b'P' => scan_string_sequence(work, i, true),
            b'_' => scan_string_sequence(work, i, false),
            b'(' | b')' => {
                if i + 2 >= len {
                    return Scan::Incomplete;
                }
                let slot = if work[i + 1] == b'(' {
                    CharsetSlot::G0
                } else {
                    CharsetSlot::G1
                };
                let charset = match work[i + 2] {
                    b'B' => Charset::Ascii,
                    b'0' => Charset::LineDrawing,
                    b'A' => Charset::Uk,
                    other => Charset::Other(other as char),
                };
                Scan::Tokens(vec![Token::CharacterSet { slot, charset }], i + 3)
            }
            b'O' if self.direction == StreamDirection::Input => {
                if i + 2 >= len {
                    return Scan::Incomplete;
                }
                Scan::Tokens(vec![ss3_token(work[i + 2])], i + 3)
            }
            b'7' => Scan::Tokens(vec![Token::SaveCursor], i + 2),
            b'8' => Scan::Tokens(vec![Token::RestoreCursor], i + 2),
            b'c' => Scan::Tokens(vec![Token::Reset], i + 2),
            b'D' => Scan::Tokens(vec![Token::Index], i + 2),
            b'M' => Scan::Tokens(vec![Token::ReverseIndex], i + 2),
            b'E' => Scan::Tokens(
                vec![Token::CursorMove {
                    direction: CursorDirection::NextLine,
                    count: 1,
                }],
                i + 2,
            ),
            b'=' => Scan::Tokens(vec![Token::KeypadMode(KeypadMode::Application)], i + 2),
            b'>' => Scan::Tokens(vec![Token::KeypadMode(KeypadMode::Numeric)], i + 2),
            b'H' | b'N' | b'O' | b'Z' => {
                Scan::Tokens(vec![Token::Unrecognized(work[i..i + 2].to_vec())], i + 2)
            }
            _ if self.direction == StreamDirection::Input => scan_alt_key(work, i),
            _ => Scan::Tokens(vec![Token::Unrecognized(work[i..i + 2].to_vec())], i + 2),
        }
    }

    fn scan_csi(&self, work: &[u8], i: usize) -> Scan {
        let len = work.len();
        let mut j = i + 2;

        let mut private = None;
        if j < len && (0x3C..=0x3F).contains(&work[j]) {
            private = Some(work[j]);
            j += 1;
        }
        let params_start = j;
        while j < len && (work[j].is_ascii_digit() || work[j] == b';' || work[j] == b':') {
            j += 1;
        }
        let params_raw = &work[params_start..j];
        let intermediates_start = j;
        while j < len && (0x20..=0x2F).contains(&work[j]) {
            j += 1;
        }
        let intermediates = &work[intermediates_start..j];
        if j >= len {
            return Scan::Incomplete;
        }
        let final_byte = work[j];
        if !(0x40..=0x7E).contains(&final_byte) {
            // The sequence broke off mid-stream; surrender what was
            // consumed without eating the offending byte, which may open
            // a fresh sequence.
            trace!(final_byte, "aborted CSI");
            return Scan::Tokens(vec![Token::Unrecognized(work[i..j].to_vec())], j);
        }

        let params = parse_params(params_raw);
        let has_params = !params_raw.is_empty();
        let tokens = self.dispatch_csi(
            final_byte,
            private,
            intermediates,
            &params,
            has_params,
            &work[i..=j],
        );
        Scan::Tokens(tokens, j + 1)
    }

    #[allow(clippy::too_many_lines)]
    fn dispatch_csi(
        &self,
        final_byte: u8,
        private: Option<u8>,
        intermediates: &[u8],
        params: &[u16],
        has_params: bool,
        raw: &[u8],
    ) -> Vec<Token> {
        let p = |idx: usize| params.get(idx).copied().unwrap_or(0);
        let n = |idx: usize| p(idx).max(1);
        let unrecognized = || vec![Token::Unrecognized(raw.to_vec())];

        // Input-only finals first; they shadow the drawing meanings.
        if self.direction == StreamDirection::Input {
            match (final_byte, private) {
                (b'A', None) => {
                    return vec![arrow(ArrowDirection::Up, p(1))];
                }
                (b'B', None) => {
                    return vec![arrow(ArrowDirection::Down, p(1))];
                }
                (b'C', None) => {
                    return vec![arrow(ArrowDirection::Right, p(1))];
                }
                (b'D', None) => {
                    return vec![arrow(ArrowDirection::Left, p(1))];
                }
                (b'Z', None) => return vec![Token::BackTab],
                (b'~', None) => {
                    return match tilde_keycode(p(0)) {
                        Some(code) => vec![Token::SpecialKey {
                            code,
                            modifiers: Modifiers::from_param(p(1)),
                        }],
                        None => unrecognized(),
                    };
                }
                (b'H', None) => {
                    return vec![Token::SpecialKey {
                        code: KeyCode::Home,
                        modifiers: Modifiers::from_param(p(1)),
                    }];
                }
                (b'F', None) => {
                    return vec![Token::SpecialKey {
                        code: KeyCode::End,
                        modifiers: Modifiers::from_param(p(1)),
                    }];
                }
                (b'P'..=b'S', None) if has_params => {
                    return vec![Token::SpecialKey {
                        code: KeyCode::F(final_byte - b'P' + 1),
                        modifiers: Modifiers::from_param(p(1)),
                    }];
                }
                (b'M' | b'm', Some(b'<')) => {
                    return vec![sgr_mouse(p(0), n(1), n(2), final_byte == b'm')];
                }
                _ => {}
            }
        }

        match final_byte {
            b'A' => vec![cursor_move(CursorDirection::Up, n(0))],
            b'B' => vec![cursor_move(CursorDirection::Down, n(0))],
            b'C' => vec![cursor_move(CursorDirection::Forward, n(0))],
            b'D' => vec![cursor_move(CursorDirection::Back, n(0))],
            b'E' => vec![cursor_move(CursorDirection::NextLine, n(0))],
            b'F' => vec![cursor_move(CursorDirection::PreviousLine, n(0))],
            b'G' | b'`' => vec![Token::CursorColumn(n(0))],
            b'd' => vec![Token::CursorRow(n(0))],
            b'H' | b'f' => vec![Token::CursorPosition {
                row: n(0),
                col: n(1),
            }],
            b'J' => vec![Token::ClearScreen(match p(0) {
                1 => ClearScreenMode::ToStart,
                2 => ClearScreenMode::All,
                3 => ClearScreenMode::AllAndScrollback,
                _ => ClearScreenMode::ToEnd,
            })],
            b'K' => vec![Token::ClearLine(match p(0) {
                1 => ClearLineMode::ToStart,
                2 => ClearLineMode::All,
                _ => ClearLineMode::ToEnd,
            })],
            b'S' => vec![Token::ScrollUp(n(0))],
            b'T' => vec![Token::ScrollDown(n(0))],
            b'L' => vec![Token::InsertLines(n(0))],
            b'M' => vec![Token::DeleteLines(n(0))],
            b'@' => vec![Token::InsertCharacters(n(0))],
            b'P' => vec![Token::DeleteCharacters(n(0))],
            b'X' => vec![Token::EraseCharacters(n(0))],
            b'b' => vec![Token::RepeatCharacter(n(0))],
            b'r' => vec![Token::ScrollRegion {
                top: p(0),
                bottom: p(1),
            }],
            b's' if !has_params => vec![Token::SaveCursor],
            b's' => vec![Token::LeftRightMargin {
                left: p(0),
                right: p(1),
            }],
            b'u' => vec![Token::RestoreCursor],
            b'h' | b'l' => {
                let enable = final_byte == b'h';
                let modes: &[u16] = if params.is_empty() { &[0] } else { params };
                modes
                    .iter()
                    .map(|&mode| Token::PrivateMode { mode, enable })
                    .collect()
            }
            b'm' if private.is_none() => vec![Token::Sgr(params.to_vec())],
            b'n' => match p(0) {
                5 => vec![Token::DeviceStatusReport(StatusReport::Status)],
                6 => vec![Token::DeviceStatusReport(StatusReport::CursorPosition)],
                _ => unrecognized(),
            },
            b'q' if intermediates == b" " => {
                vec![Token::CursorShape(CursorShape::from_param(p(0)))]
            }
            _ => unrecognized(),
        }
    }

    fn scan_osc(&self, work: &[u8], i: usize) -> Scan {
        let len = work.len();
        let mut j = i + 2;
        while j < len {
            match work[j] {
                BEL => return Scan::Tokens(vec![parse_osc(&work[i + 2..j])], j + 1),
                ESC => {
                    if j + 1 >= len {
                        return Scan::Incomplete;
                    }
                    if work[j + 1] == b'\\' {
                        return Scan::Tokens(vec![parse_osc(&work[i + 2..j])], j + 2);
                    }
                    // A stray ESC cancels the OSC; leave it for the next scan.
                    return Scan::Tokens(vec![parse_osc(&work[i + 2..j])], j);
                }
                _ => j += 1,
            }
        }
        Scan::Incomplete
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(StreamDirection::Output)
    }
}

/// DCS (`ESC P … ESC \`) and APC (`ESC _ … ESC \`). The payload is kept
/// opaque; APC bodies are surfaced as `Unrecognized`.
fn scan_string_sequence(work: &[u8], i: usize, is_dcs: bool) -> Scan {
    let len = work.len();
    let mut j = i + 2;
    while j < len {
        if work[j] == ESC {
            if j + 1 >= len {
                return Scan::Incomplete;
            }
            if work[j + 1] == b'\\' {
                let token = if is_dcs {
                    Token::Dcs(work[i + 2..j].to_vec())
                } else {
                    Token::Unrecognized(work[i..j + 2].to_vec())
                };
                return Scan::Tokens(vec![token], j + 2);
            }
        }
        j += 1;
    }
    Scan::Incomplete
}

/// `ESC <char>` in the input direction is Alt+key.
fn scan_alt_key(work: &[u8], i: usize) -> Scan {
    let rest = &work[i + 1..];
    match std::str::from_utf8(rest) {
        Ok(s) => match s.chars().next() {
            Some(c) => alt_key_scan(c, i),
            None => Scan::Incomplete,
        },
        Err(err) => {
            if err.valid_up_to() == 0 {
                if err.error_len().is_none() {
                    Scan::Incomplete
                } else {
                    Scan::Tokens(vec![Token::Unrecognized(work[i..i + 2].to_vec())], i + 2)
                }
            } else {
                let s = std::str::from_utf8(&rest[..err.valid_up_to()]).unwrap_or_default();
                match s.chars().next() {
                    Some(c) => alt_key_scan(c, i),
                    None => Scan::Incomplete,
                }
            }
        }
    }
}

fn alt_key_scan(c: char, i: usize) -> Scan {
    Scan::Tokens(
        vec![Token::SpecialKey {
            code: KeyCode::Char(c),
            modifiers: Modifiers::ALT,
        }],
        i + 1 + c.len_utf8(),
    )
}

fn cursor_move(direction: CursorDirection, count: u16) -> Token {
    Token::CursorMove { direction, count }
}

fn arrow(direction: ArrowDirection, mod_param: u16) -> Token {
    Token::ArrowKey {
        direction,
        modifiers: Modifiers::from_param(mod_param),
    }
}

fn ss3_token(final_byte: u8) -> Token {
    match final_byte {
        b'A' => arrow(ArrowDirection::Up, 0),
        b'B' => arrow(ArrowDirection::Down, 0),
        b'C' => arrow(ArrowDirection::Right, 0),
        b'D' => arrow(ArrowDirection::Left, 0),
        b'H' => Token::SpecialKey {
            code: KeyCode::Home,
            modifiers: Modifiers::empty(),
        },
        b'F' => Token::SpecialKey {
            code: KeyCode::End,
            modifiers: Modifiers::empty(),
        },
        b'P'..=b'S' => Token::SpecialKey {
            code: KeyCode::F(final_byte - b'P' + 1),
            modifiers: Modifiers::empty(),
        },
        other => Token::Ss3(other as char),
    }
}

fn tilde_keycode(code: u16) -> Option<KeyCode> {
    Some(match code {
        1 | 7 => KeyCode::Home,
        2 => KeyCode::Insert,
        3 => KeyCode::Delete,
        4 | 8 => KeyCode::End,
        5 => KeyCode::PageUp,
        6 => KeyCode::PageDown,
        11..=15 => KeyCode::F(code as u8 - 10),
        17..=21 => KeyCode::F(code as u8 - 11),
        23 | 24 => KeyCode::F(code as u8 - 12),
        _ => return None,
    })
}

fn sgr_mouse(raw: u16, x: u16, y: u16, release: bool) -> Token {
    let mut modifiers = Modifiers::empty();
    modifiers.set(Modifiers::SHIFT, raw & 4 != 0);
    modifiers.set(Modifiers::ALT, raw & 8 != 0);
    modifiers.set(Modifiers::CTRL, raw & 16 != 0);

    let wheel = raw & 64 != 0;
    let motion = raw & 32 != 0;
    let button = if wheel {
        if raw & 1 == 0 {
            MouseButton::WheelUp
        } else {
            MouseButton::WheelDown
        }
    } else {
        match raw & 3 {
            0 => MouseButton::Left,
            1 => MouseButton::Middle,
            2 => MouseButton::Right,
            _ => MouseButton::None,
        }
    };
    let action = if release {
        MouseAction::Up
    } else if motion {
        if button == MouseButton::None {
            MouseAction::Move
        } else {
            MouseAction::Drag
        }
    } else {
        MouseAction::Down
    };

    Token::SgrMouse {
        button,
        action,
        x: x - 1,
        y: y - 1,
        modifiers,
        raw_button: raw,
    }
}

fn parse_params(raw: &[u8]) -> Vec<u16> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(|&b| b == b';' || b == b':')
        .map(|seg| {
            seg.iter()
                .fold(0u32, |acc, &b| {
                    (acc.saturating_mul(10)).saturating_add((b - b'0') as u32)
                })
                .min(u16::MAX as u32) as u16
        })
        .collect()
}

fn parse_osc(body: &[u8]) -> Token {
    let text = String::from_utf8_lossy(body);
    let mut parts = text.splitn(2, ';');
    let command = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(u16::MAX);
    let rest = parts.next().unwrap_or("");

    // Commands with a parameter slot before the payload keep it separate;
    // everything else treats the remainder as payload.
    let (params, payload) = match command {
        8 | 52 => match rest.split_once(';') {
            Some((params, payload)) => (params.to_string(), payload.to_string()),
            None => (rest.to_string(), String::new()),
        },
        _ => (String::new(), rest.to_string()),
    };

    Token::Osc {
        command,
        params,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> Tokenizer {
        Tokenizer::new(StreamDirection::Output)
    }

    fn input() -> Tokenizer {
        Tokenizer::new(StreamDirection::Input)
    }

    #[test]
    fn plain_text() {
        let mut t = output();
        assert_eq!(
            t.advance(b"Hello, World!"),
            vec![Token::Text("Hello, World!".into())]
        );
        assert!(t.pending().is_empty());
    }

    #[test]
    fn control_chars_split_text() {
        let mut t = output();
        let tokens = t.advance(b"ab\r\ncd");
        assert_eq!(
            tokens,
            vec![
                Token::Text("ab".into()),
                Token::ControlChar(0x0D),
                Token::ControlChar(0x0A),
                Token::Text("cd".into()),
            ]
        );
    }

    #[test]
    fn csi_cursor_position() {
        let mut t = output();
        assert_eq!(
            t.advance(b"\x1b[10;20H"),
            vec![Token::CursorPosition { row: 10, col: 20 }]
        );
    }

    #[test]
    fn csi_split_across_chunks() {
        let mut t = output();
        assert_eq!(t.advance(b"\x1b[3"), vec![]);
        assert_eq!(t.pending(), b"\x1b[3");
        assert_eq!(
            t.advance(b"8;5;123m"),
            vec![Token::Sgr(vec![38, 5, 123])]
        );
        assert!(t.pending().is_empty());
    }

    #[test]
    fn bare_esc_is_buffered() {
        let mut t = output();
        assert_eq!(t.advance(b"abc\x1b"), vec![Token::Text("abc".into())]);
        assert_eq!(t.pending(), b"\x1b");
        assert_eq!(t.advance(b"[2J"), vec![Token::ClearScreen(ClearScreenMode::All)]);
    }

    #[test]
    fn osc_bel_and_st_terminated() {
        let mut t = output();
        assert_eq!(
            t.advance(b"\x1b]2;my title\x07"),
            vec![Token::Osc {
                command: 2,
                params: String::new(),
                payload: "my title".into(),
            }]
        );
        assert_eq!(
            t.advance(b"\x1b]8;id=42;https://ex\x1b\\"),
            vec![Token::Osc {
                command: 8,
                params: "id=42".into(),
                payload: "https://ex".into(),
            }]
        );
    }

    #[test]
    fn osc_split_across_chunks() {
        let mut t = output();
        assert_eq!(t.advance(b"\x1b]0;part"), vec![]);
        assert_eq!(
            t.advance(b"ial\x07"),
            vec![Token::Osc {
                command: 0,
                params: String::new(),
                payload: "partial".into(),
            }]
        );
    }

    #[test]
    fn dcs_payload_opaque() {
        let mut t = output();
        assert_eq!(
            t.advance(b"\x1bPq#0;2;0;0;0#0~~\x1b\\"),
            vec![Token::Dcs(b"q#0;2;0;0;0#0~~".to_vec())]
        );
    }

    #[test]
    fn dcs_waits_for_st() {
        let mut t = output();
        assert_eq!(t.advance(b"\x1bPq123"), vec![]);
        assert_eq!(t.advance(b"456"), vec![]);
        assert_eq!(
            t.advance(b"\x1b\\"),
            vec![Token::Dcs(b"q123456".to_vec())]
        );
    }

    #[test]
    fn two_byte_escapes() {
        let mut t = output();
        assert_eq!(t.advance(b"\x1b7"), vec![Token::SaveCursor]);
        assert_eq!(t.advance(b"\x1b8"), vec![Token::RestoreCursor]);
        assert_eq!(t.advance(b"\x1bD"), vec![Token::Index]);
        assert_eq!(t.advance(b"\x1bM"), vec![Token::ReverseIndex]);
        assert_eq!(t.advance(b"\x1bc"), vec![Token::Reset]);
        assert_eq!(
            t.advance(b"\x1b="),
            vec![Token::KeypadMode(KeypadMode::Application)]
        );
    }

    #[test]
    fn charset_needs_following_byte() {
        let mut t = output();
        assert_eq!(t.advance(b"\x1b("), vec![]);
        assert_eq!(
            t.advance(b"0"),
            vec![Token::CharacterSet {
                slot: CharsetSlot::G0,
                charset: Charset::LineDrawing,
            }]
        );
    }

    #[test]
    fn private_modes_expand_per_param() {
        let mut t = output();
        assert_eq!(
            t.advance(b"\x1b[?1049;25h"),
            vec![
                Token::PrivateMode {
                    mode: 1049,
                    enable: true
                },
                Token::PrivateMode {
                    mode: 25,
                    enable: true
                },
            ]
        );
    }

    #[test]
    fn utf8_split_across_chunks() {
        let mut t = output();
        let bytes = "é".as_bytes();
        assert_eq!(t.advance(&bytes[..1]), vec![]);
        assert_eq!(t.pending(), &bytes[..1]);
        assert_eq!(t.advance(&bytes[1..]), vec![Token::Text("é".into())]);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut t = output();
        assert_eq!(
            t.advance(b"a\xFFb"),
            vec![Token::Text("a\u{FFFD}b".into())]
        );
    }

    #[test]
    fn unrecognized_sequences_are_not_fatal() {
        let mut t = output();
        let tokens = t.advance(b"\x1b[>1;2c after");
        assert_eq!(tokens.len(), 2);
        assert!(matches!(tokens[0], Token::Unrecognized(_)));
        assert_eq!(tokens[1], Token::Text(" after".into()));
    }

    #[test]
    fn input_arrows_and_backtab() {
        let mut t = input();
        assert_eq!(
            t.advance(b"\x1b[A\x1b[1;5C\x1b[Z"),
            vec![
                Token::ArrowKey {
                    direction: ArrowDirection::Up,
                    modifiers: Modifiers::empty()
                },
                Token::ArrowKey {
                    direction: ArrowDirection::Right,
                    modifiers: Modifiers::CTRL
                },
                Token::BackTab,
            ]
        );
    }

    #[test]
    fn input_ss3_keys() {
        let mut t = input();
        assert_eq!(
            t.advance(b"\x1bOP\x1bOB"),
            vec![
                Token::SpecialKey {
                    code: KeyCode::F(1),
                    modifiers: Modifiers::empty()
                },
                Token::ArrowKey {
                    direction: ArrowDirection::Down,
                    modifiers: Modifiers::empty()
                },
            ]
        );
    }

    #[test]
    fn input_tilde_keys() {
        let mut t = input();
        assert_eq!(
            t.advance(b"\x1b[5~\x1b[3;2~"),
            vec![
                Token::SpecialKey {
                    code: KeyCode::PageUp,
                    modifiers: Modifiers::empty()
                },
                Token::SpecialKey {
                    code: KeyCode::Delete,
                    modifiers: Modifiers::SHIFT
                },
            ]
        );
    }

    #[test]
    fn input_alt_key() {
        let mut t = input();
        assert_eq!(
            t.advance(b"\x1bx"),
            vec![Token::SpecialKey {
                code: KeyCode::Char('x'),
                modifiers: Modifiers::ALT
            }]
        );
    }

    #[test]
    fn input_sgr_mouse() {
        let mut t = input();
        assert_eq!(
            t.advance(b"\x1b[<0;10;5M"),
            vec![Token::SgrMouse {
                button: MouseButton::Left,
                action: MouseAction::Down,
                x: 9,
                y: 4,
                modifiers: Modifiers::empty(),
                raw_button: 0,
            }]
        );
        assert_eq!(
            t.advance(b"\x1b[<16;1;1m"),
            vec![Token::SgrMouse {
                button: MouseButton::Left,
                action: MouseAction::Up,
                x: 0,
                y: 0,
                modifiers: Modifiers::CTRL,
                raw_button: 16,
            }]
        );
    }

    #[test]
    fn output_direction_keeps_drawing_semantics() {
        let mut t = output();
        assert_eq!(
            t.advance(b"\x1b[A"),
            vec![Token::CursorMove {
                direction: CursorDirection::Up,
                count: 1
            }]
        );
    }

    #[test]
    fn finish_drains_pending() {
        let mut t = output();
        t.advance(b"\x1b[12");
        let tokens = t.finish();
        assert_eq!(tokens, vec![Token::Unrecognized(b"\x1b[12".to_vec())]);
        assert!(t.pending().is_empty());
    }
}
