use cathode_common::types::Size;
use cathode_core::{Compositor, CursorState, Emulator, Style};
use proptest::prelude::*;

/// Fragments that stress the emulator: plain text, controls, wide and
/// combining characters, well-formed sequences, and raw byte soup.
fn stream_fragment() -> impl Strategy<Value = Vec<u8>> {
    let printing = prop_oneof![
        "[ -~]{0,12}".prop_map(String::into_bytes),
        Just(b"\r\n".to_vec()),
        Just("漢字".as_bytes().to_vec()),
        Just("e\u{0301}".as_bytes().to_vec()),
        (1u16..10).prop_map(|n| format!("\x1b[{n}b").into_bytes()),
        proptest::collection::vec(any::<u8>(), 0..16),
    ];
    let sequences = prop_oneof![
        (1u16..30, 1u16..30).prop_map(|(r, c)| format!("\x1b[{r};{c}H").into_bytes()),
        (0u16..5).prop_map(|n| format!("\x1b[{n}J").into_bytes()),
        (1u16..10).prop_map(|n| format!("\x1b[{n}A").into_bytes()),
        (1u16..10).prop_map(|n| format!("\x1b[{n}@").into_bytes()),
        (1u16..10).prop_map(|n| format!("\x1b[{n}P").into_bytes()),
        (1u16..8, 1u16..8).prop_map(|(t, b)| format!("\x1b[{t};{b}r").into_bytes()),
        prop_oneof![
            Just(b"\x1b[?1049h".to_vec()),
            Just(b"\x1b[?1049l".to_vec()),
            Just(b"\x1b[?69h\x1b[2;5s".to_vec()),
            Just(b"\x1b]8;;https://ex\x07link\x1b]8;;\x07".to_vec()),
            Just(b"\x1b7\x1b8\x1bD\x1bM".to_vec()),
        ],
    ];
    prop_oneof![printing, sequences]
}

proptest! {
    /// The emulator accepts arbitrary byte streams without panicking and
    /// keeps the cursor inside the grid after every chunk.
    #[test]
    fn cursor_stays_in_bounds_under_byte_soup(
        fragments in proptest::collection::vec(stream_fragment(), 1..40),
        width in 1u16..40,
        height in 1u16..20,
    ) {
        let mut emulator = Emulator::new(Size::new(width, height));
        for fragment in &fragments {
            emulator.feed(fragment);
            let cursor = emulator.cursor();
            prop_assert!(cursor.x < width, "x={} width={}", cursor.x, width);
            prop_assert!(cursor.y < height, "y={} height={}", cursor.y, height);
            if cursor.pending_wrap {
                prop_assert!(cursor.x == width - 1 || emulator.private_mode_enabled(69));
            }
        }
    }

    /// Diff fidelity: for any two rendered frames A then B, applying the
    /// emitted bytes of diff(A, B) to an emulator holding A yields B.
    #[test]
    fn diff_brings_a_screen_from_a_to_b(
        frame_a in frame_strategy(),
        frame_b in frame_strategy(),
    ) {
        let size = Size::new(16, 6);
        let mut compositor = Compositor::new(size, (10.0, 20.0));
        let mut emulator = Emulator::new(size);

        emulator.feed(&render(&mut compositor, size, &frame_a));
        emulator.feed(&render(&mut compositor, size, &frame_b));

        for y in 0..size.height {
            for x in 0..size.width {
                let want = compositor.current().cell(x, y).unwrap();
                let got = emulator.grid().cell(x, y).unwrap();
                prop_assert_eq!(want, got, "mismatch at ({}, {})", x, y);
            }
        }
    }
}

type Frame = Vec<(u16, u16, String)>;

fn frame_strategy() -> impl Strategy<Value = Frame> {
    proptest::collection::vec(
        (0u16..16, 0u16..6, "[ -~]{0,10}|漢|字漢b"),
        0..8,
    )
}

fn render(compositor: &mut Compositor, size: Size, frame: &Frame) -> Vec<u8> {
    let mut ctx = compositor.begin_frame(size, (10.0, 20.0));
    for (x, y, text) in frame {
        ctx.move_to(*x, *y);
        ctx.print(text);
    }
    compositor.end_frame(CursorState::default())
}

#[test]
fn styles_survive_the_diff_round_trip() {
    use cathode_common::types::{CellFlags, Color};

    let size = Size::new(10, 2);
    let mut compositor = Compositor::new(size, (10.0, 20.0));
    let mut emulator = Emulator::new(size);

    let mut ctx = compositor.begin_frame(size, (10.0, 20.0));
    ctx.set_style(Style {
        fg: Some(Color::Indexed(123)),
        bg: Some(Color::Rgb(1, 2, 3)),
        flags: CellFlags::BOLD | CellFlags::UNDERLINE,
    });
    ctx.print("styled");
    let bytes = compositor.end_frame(CursorState::default());
    emulator.feed(&bytes);

    let cell = emulator.grid().cell(0, 0).unwrap();
    assert_eq!(cell.fg, Some(Color::Indexed(123)));
    assert_eq!(cell.bg, Some(Color::Rgb(1, 2, 3)));
    assert!(cell.flags.contains(CellFlags::BOLD | CellFlags::UNDERLINE));
}
