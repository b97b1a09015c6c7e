use cathode_common::input::{KeyCode, Modifiers, MouseAction, MouseButton};
use cathode_common::types::CursorShape;

/// How the display should be cleared (`CSI Ps J`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScreenMode {
    ToEnd,
    ToStart,
    All,
    AllAndScrollback,
}

/// How the current line should be cleared (`CSI Ps K`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearLineMode {
    ToEnd,
    ToStart,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorDirection {
    Up,
    Down,
    Forward,
    Back,
    NextLine,
    PreviousLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReport {
    /// `CSI 5 n`, answered with `ESC [ 0 n`.
    Status,
    /// `CSI 6 n`, answered with `ESC [ row ; col R`.
    CursorPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharsetSlot {
    G0,
    G1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Ascii,
    LineDrawing,
    Uk,
    Other(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeypadMode {
    Application,
    Numeric,
}

/// The closed token set shared by both stream directions.
///
/// Output-direction bytes (what an application writes to its terminal)
/// produce the drawing and mode tokens; input-direction bytes (what a
/// terminal sends the application) produce the key and mouse tokens. All
/// numeric positions carry their 1-based wire values except mouse
/// coordinates, which are normalized to 0-based cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text(String),
    /// A bare C0 control byte.
    ControlChar(u8),
    /// Raw SGR parameter list, colon subparameters normalized to
    /// semicolons. Empty means reset.
    Sgr(Vec<u16>),
    CursorPosition {
        row: u16,
        col: u16,
    },
    CursorMove {
        direction: CursorDirection,
        count: u16,
    },
    CursorColumn(u16),
    CursorRow(u16),
    ClearScreen(ClearScreenMode),
    ClearLine(ClearLineMode),
    ScrollUp(u16),
    ScrollDown(u16),
    InsertLines(u16),
    DeleteLines(u16),
    InsertCharacters(u16),
    DeleteCharacters(u16),
    EraseCharacters(u16),
    RepeatCharacter(u16),
    /// `CSI t ; b r` (DECSTBM); zero means "use the default edge".
    ScrollRegion {
        top: u16,
        bottom: u16,
    },
    /// `CSI l ; r s` (DECSLRM); zero means "use the default edge".
    LeftRightMargin {
        left: u16,
        right: u16,
    },
    SaveCursor,
    RestoreCursor,
    Index,
    ReverseIndex,
    /// Full reset (`ESC c`).
    Reset,
    PrivateMode {
        mode: u16,
        enable: bool,
    },
    CursorShape(CursorShape),
    CharacterSet {
        slot: CharsetSlot,
        charset: Charset,
    },
    KeypadMode(KeypadMode),
    Osc {
        command: u16,
        params: String,
        payload: String,
    },
    Dcs(Vec<u8>),
    DeviceStatusReport(StatusReport),
    SgrMouse {
        button: MouseButton,
        action: MouseAction,
        x: u16,
        y: u16,
        modifiers: Modifiers,
        raw_button: u16,
    },
    /// An SS3-introduced final that is not a recognized key.
    Ss3(char),
    SpecialKey {
        code: KeyCode,
        modifiers: Modifiers,
    },
    ArrowKey {
        direction: ArrowDirection,
        modifiers: Modifiers,
    },
    BackTab,
    /// Anything the tokenizer consumed but could not classify. Never
    /// fatal; the emulator ignores these.
    Unrecognized(Vec<u8>),
}

impl Token {
    /// Whether this token came from the input direction (keys, mouse) as
    /// opposed to the drawing stream.
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            Token::SgrMouse { .. }
                | Token::Ss3(_)
                | Token::SpecialKey { .. }
                | Token::ArrowKey { .. }
                | Token::BackTab
        )
    }
}
