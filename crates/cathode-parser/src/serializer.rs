use cathode_common::input::{InputEvent, KeyCode, KeyEvent, Modifiers, MouseAction, MouseButton, MouseEvent};

use crate::token::{
    ArrowDirection, Charset, CharsetSlot, ClearLineMode, ClearScreenMode, CursorDirection,
    KeypadMode, StatusReport, Token,
};

const ESC: u8 = 0x1B;

/// Serialize a token stream back into bytes. Tokenizing the result yields
/// the same stream for every token the library itself emits.
pub fn serialize(tokens: &[Token]) -> Vec<u8> {
    let mut out = Vec::new();
    for token in tokens {
        serialize_token(token, &mut out);
    }
    out
}

#[allow(clippy::too_many_lines)]
pub fn serialize_token(token: &Token, out: &mut Vec<u8>) {
    match token {
        Token::Text(s) => out.extend_from_slice(s.as_bytes()),
        Token::ControlChar(b) => out.push(*b),
        Token::Sgr(params) => {
            if params.is_empty() {
                out.extend_from_slice(b"\x1b[m");
            } else {
                csi(out, params, b'm');
            }
        }
        Token::CursorPosition { row, col } => csi(out, &[*row, *col], b'H'),
        Token::CursorMove { direction, count } => {
            let final_byte = match direction {
                CursorDirection::Up => b'A',
                CursorDirection::Down => b'B',
                CursorDirection::Forward => b'C',
                CursorDirection::Back => b'D',
                CursorDirection::NextLine => b'E',
                CursorDirection::PreviousLine => b'F',
            };
            csi_n(out, *count, final_byte);
        }
        Token::CursorColumn(col) => csi_n(out, *col, b'G'),
        Token::CursorRow(row) => csi_n(out, *row, b'd'),
        Token::ClearScreen(mode) => {
            let param = match mode {
                ClearScreenMode::ToEnd => 0,
                ClearScreenMode::ToStart => 1,
                ClearScreenMode::All => 2,
                ClearScreenMode::AllAndScrollback => 3,
            };
            csi(out, &[param], b'J');
        }
        Token::ClearLine(mode) => {
            let param = match mode {
                ClearLineMode::ToEnd => 0,
                ClearLineMode::ToStart => 1,
                ClearLineMode::All => 2,
            };
            csi(out, &[param], b'K');
        }
        Token::ScrollUp(n) => csi_n(out, *n, b'S'),
        Token::ScrollDown(n) => csi_n(out, *n, b'T'),
        Token::InsertLines(n) => csi_n(out, *n, b'L'),
        Token::DeleteLines(n) => csi_n(out, *n, b'M'),
        Token::InsertCharacters(n) => csi_n(out, *n, b'@'),
        Token::DeleteCharacters(n) => csi_n(out, *n, b'P'),
        Token::EraseCharacters(n) => csi_n(out, *n, b'X'),
        Token::RepeatCharacter(n) => csi_n(out, *n, b'b'),
        Token::ScrollRegion { top, bottom } => csi(out, &[*top, *bottom], b'r'),
        Token::LeftRightMargin { left, right } => csi(out, &[*left, *right], b's'),
        Token::SaveCursor => out.extend_from_slice(b"\x1b7"),
        Token::RestoreCursor => out.extend_from_slice(b"\x1b8"),
        Token::Index => out.extend_from_slice(b"\x1bD"),
        Token::ReverseIndex => out.extend_from_slice(b"\x1bM"),
        Token::Reset => out.extend_from_slice(b"\x1bc"),
        Token::PrivateMode { mode, enable } => {
            out.extend_from_slice(b"\x1b[?");
            push_number(out, *mode);
            out.push(if *enable { b'h' } else { b'l' });
        }
        Token::CursorShape(shape) => {
            out.extend_from_slice(b"\x1b[");
            push_number(out, shape.to_param());
            out.extend_from_slice(b" q");
        }
        Token::CharacterSet { slot, charset } => {
            out.push(ESC);
            out.push(match slot {
                CharsetSlot::G0 => b'(',
                CharsetSlot::G1 => b')',
            });
            out.push(match charset {
                Charset::Ascii => b'B',
                Charset::LineDrawing => b'0',
                Charset::Uk => b'A',
                Charset::Other(c) => *c as u8,
            });
        }
        Token::KeypadMode(mode) => out.extend_from_slice(match mode {
            KeypadMode::Application => b"\x1b=",
            KeypadMode::Numeric => b"\x1b>",
        }),
        Token::Osc {
            command,
            params,
            payload,
        } => {
            out.extend_from_slice(b"\x1b]");
            push_number(out, *command);
            out.push(b';');
            if matches!(command, 8 | 52) {
                out.extend_from_slice(params.as_bytes());
                out.push(b';');
            }
            out.extend_from_slice(payload.as_bytes());
            out.push(0x07);
        }
        Token::Dcs(payload) => {
            out.extend_from_slice(b"\x1bP");
            out.extend_from_slice(payload);
            out.extend_from_slice(b"\x1b\\");
        }
        Token::DeviceStatusReport(kind) => {
            let param = match kind {
                StatusReport::Status => 5,
                StatusReport::CursorPosition => 6,
            };
            csi(out, &[param], b'n');
        }
        Token::SgrMouse {
            raw_button,
            action,
            x,
            y,
            ..
        } => {
            out.extend_from_slice(b"\x1b[<");
            push_number(out, *raw_button);
            out.push(b';');
            push_number(out, x + 1);
            out.push(b';');
            push_number(out, y + 1);
            out.push(if *action == MouseAction::Up { b'm' } else { b'M' });
        }
        Token::Ss3(c) => {
            out.extend_from_slice(b"\x1bO");
            out.push(*c as u8);
        }
        Token::SpecialKey { code, modifiers } => encode_key_bytes(*code, *modifiers, out),
        Token::ArrowKey {
            direction,
            modifiers,
        } => encode_arrow(*direction, *modifiers, out),
        Token::BackTab => out.extend_from_slice(b"\x1b[Z"),
        Token::Unrecognized(raw) => out.extend_from_slice(raw),
    }
}

/// Encode a structured input event as terminal input bytes, as a real
/// terminal would have produced them.
pub fn encode_event(event: &InputEvent) -> Vec<u8> {
    let mut out = Vec::new();
    match event {
        InputEvent::Key(key) => encode_key_event(key, &mut out),
        InputEvent::Mouse(mouse) => encode_mouse(mouse, &mut out),
        InputEvent::Text(s) => out.extend_from_slice(s.as_bytes()),
        // Resize and focus are delivered out of band.
        InputEvent::Resize(_) | InputEvent::FocusGained | InputEvent::FocusLost => {}
    }
    out
}

fn encode_key_event(key: &KeyEvent, out: &mut Vec<u8>) {
    match key.code {
        KeyCode::Char(c) if key.modifiers.contains(Modifiers::CTRL) && c.is_ascii_alphabetic() => {
            if key.modifiers.contains(Modifiers::ALT) {
                out.push(ESC);
            }
            out.push((c.to_ascii_uppercase() as u8) & 0x1F);
        }
        KeyCode::Char(c) if key.modifiers.contains(Modifiers::ALT) => {
            out.push(ESC);
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        KeyCode::Char(c) => {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        KeyCode::Enter => prefixed_c0(out, key.modifiers, b'\r'),
        KeyCode::Tab => prefixed_c0(out, key.modifiers, b'\t'),
        KeyCode::Backspace => prefixed_c0(out, key.modifiers, 0x7F),
        KeyCode::Escape => prefixed_c0(out, key.modifiers, ESC),
        code => encode_key_bytes(code, key.modifiers, out),
    }
}

fn prefixed_c0(out: &mut Vec<u8>, modifiers: Modifiers, byte: u8) {
    if modifiers.contains(Modifiers::ALT) {
        out.push(ESC);
    }
    out.push(byte);
}

fn encode_key_bytes(code: KeyCode, modifiers: Modifiers, out: &mut Vec<u8>) {
    match code {
        KeyCode::Char(c) => {
            if modifiers.contains(Modifiers::ALT) {
                out.push(ESC);
            }
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        KeyCode::Enter => out.push(b'\r'),
        KeyCode::Tab => out.push(b'\t'),
        KeyCode::Backspace => out.push(0x7F),
        KeyCode::Escape => out.push(ESC),
        KeyCode::BackTab => out.extend_from_slice(b"\x1b[Z"),
        KeyCode::Up => encode_arrow(ArrowDirection::Up, modifiers, out),
        KeyCode::Down => encode_arrow(ArrowDirection::Down, modifiers, out),
        KeyCode::Left => encode_arrow(ArrowDirection::Left, modifiers, out),
        KeyCode::Right => encode_arrow(ArrowDirection::Right, modifiers, out),
        KeyCode::Home => encode_hf(b'H', modifiers, out),
        KeyCode::End => encode_hf(b'F', modifiers, out),
        KeyCode::Insert => encode_tilde(2, modifiers, out),
        KeyCode::Delete => encode_tilde(3, modifiers, out),
        KeyCode::PageUp => encode_tilde(5, modifiers, out),
        KeyCode::PageDown => encode_tilde(6, modifiers, out),
        KeyCode::F(n @ 1..=4) => {
            let final_byte = b'P' + n - 1;
            if modifiers.is_empty() {
                out.extend_from_slice(b"\x1bO");
                out.push(final_byte);
            } else {
                out.extend_from_slice(b"\x1b[1;");
                push_number(out, modifiers.to_param());
                out.push(final_byte);
            }
        }
        KeyCode::F(n) => {
            let code = match n {
                5 => 15,
                6..=10 => 11 + n as u16,
                11 | 12 => 12 + n as u16,
                _ => return,
            };
            encode_tilde(code, modifiers, out);
        }
    }
}

fn encode_arrow(direction: ArrowDirection, modifiers: Modifiers, out: &mut Vec<u8>) {
    let final_byte = match direction {
        ArrowDirection::Up => b'A',
        ArrowDirection::Down => b'B',
        ArrowDirection::Right => b'C',
        ArrowDirection::Left => b'D',
    };
    if modifiers.is_empty() {
        out.extend_from_slice(b"\x1b[");
        out.push(final_byte);
    } else {
        out.extend_from_slice(b"\x1b[1;");
        push_number(out, modifiers.to_param());
        out.push(final_byte);
    }
}

fn encode_hf(final_byte: u8, modifiers: Modifiers, out: &mut Vec<u8>) {
    if modifiers.is_empty() {
        out.extend_from_slice(b"\x1b[");
        out.push(final_byte);
    } else {
        out.extend_from_slice(b"\x1b[1;");
        push_number(out, modifiers.to_param());
        out.push(final_byte);
    }
}

fn encode_tilde(code: u16, modifiers: Modifiers, out: &mut Vec<u8>) {
    out.extend_from_slice(b"\x1b[");
    push_number(out, code);
    if !modifiers.is_empty() {
        out.push(b';');
        push_number(out, modifiers.to_param());
    }
    out.push(b'~');
}

fn encode_mouse(mouse: &MouseEvent, out: &mut Vec<u8>) {
    let mut raw: u16 = match mouse.button {
        MouseButton::Left => 0,
        MouseButton::Middle => 1,
        MouseButton::Right => 2,
        MouseButton::None => 3,
        MouseButton::WheelUp => 64,
        MouseButton::WheelDown => 65,
    };
    if matches!(mouse.action, MouseAction::Move | MouseAction::Drag) {
        raw |= 32;
    }
    if mouse.modifiers.contains(Modifiers::SHIFT) {
        raw |= 4;
    }
    if mouse.modifiers.contains(Modifiers::ALT) {
        raw |= 8;
    }
    if mouse.modifiers.contains(Modifiers::CTRL) {
        raw |= 16;
    }

    out.extend_from_slice(b"\x1b[<");
    push_number(out, raw);
    out.push(b';');
    push_number(out, mouse.pos.x + 1);
    out.push(b';');
    push_number(out, mouse.pos.y + 1);
    out.push(if mouse.action == MouseAction::Up {
        b'm'
    } else {
        b'M'
    });
}

fn csi(out: &mut Vec<u8>, params: &[u16], final_byte: u8) {
    out.extend_from_slice(b"\x1b[");
    for (idx, p) in params.iter().enumerate() {
        if idx > 0 {
            out.push(b';');
        }
        push_number(out, *p);
    }
    out.push(final_byte);
}

fn csi_n(out: &mut Vec<u8>, n: u16, final_byte: u8) {
    csi(out, &[n], final_byte);
}

fn push_number(out: &mut Vec<u8>, n: u16) {
    let mut buf = itoa(n);
    out.append(&mut buf);
}

fn itoa(n: u16) -> Vec<u8> {
    let mut digits = Vec::with_capacity(5);
    let mut n = n as u32;
    loop {
        digits.push(b'0' + (n % 10) as u8);
        n /= 10;
        if n == 0 {
            break;
        }
    }
    digits.reverse();
    digits
}

#[cfg(test)]
mod tests {
    use super::*;
    use cathode_common::types::Pos;

    #[test]
    fn serializes_basic_drawing_tokens() {
        assert_eq!(
            serialize(&[Token::CursorPosition { row: 3, col: 7 }]),
            b"\x1b[3;7H"
        );
        assert_eq!(
            serialize(&[Token::Sgr(vec![1, 31])]),
            b"\x1b[1;31m"
        );
        assert_eq!(
            serialize(&[Token::ClearScreen(ClearScreenMode::All)]),
            b"\x1b[2J"
        );
        assert_eq!(
            serialize(&[Token::PrivateMode {
                mode: 1049,
                enable: false
            }]),
            b"\x1b[?1049l"
        );
    }

    #[test]
    fn encodes_ctrl_and_alt_keys() {
        let ctrl_c = InputEvent::Key(KeyEvent::new(KeyCode::Char('c'), Modifiers::CTRL));
        assert_eq!(encode_event(&ctrl_c), vec![0x03]);

        let alt_x = InputEvent::Key(KeyEvent::new(KeyCode::Char('x'), Modifiers::ALT));
        assert_eq!(encode_event(&alt_x), b"\x1bx");

        let plain = InputEvent::Key(KeyEvent::plain(KeyCode::Char('é')));
        assert_eq!(encode_event(&plain), "é".as_bytes());
    }

    #[test]
    fn encodes_arrows_with_modifiers() {
        let up = InputEvent::Key(KeyEvent::plain(KeyCode::Up));
        assert_eq!(encode_event(&up), b"\x1b[A");

        let ctrl_right = InputEvent::Key(KeyEvent::new(KeyCode::Right, Modifiers::CTRL));
        assert_eq!(encode_event(&ctrl_right), b"\x1b[1;5C");
    }

    #[test]
    fn encodes_mouse_press_release() {
        let down = InputEvent::Mouse(MouseEvent {
            button: MouseButton::Left,
            action: MouseAction::Down,
            pos: Pos::new(9, 4),
            modifiers: Modifiers::empty(),
        });
        assert_eq!(encode_event(&down), b"\x1b[<0;10;5M");

        let up = InputEvent::Mouse(MouseEvent {
            button: MouseButton::Left,
            action: MouseAction::Up,
            pos: Pos::new(0, 0),
            modifiers: Modifiers::CTRL,
        });
        assert_eq!(encode_event(&up), b"\x1b[<16;1;1m");
    }
}
