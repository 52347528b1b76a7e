//! Quoted-printable body decoding
//!
//! Runs of `=XY` escapes are turned back into bytes and mapped one byte per
//! character (Latin-1), then soft line breaks are removed. Multi-byte source
//! charsets are not reassembled.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// One or more consecutive escapes with uppercase hex digits
static ESCAPE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:=[0-9A-F]{2})+").expect("escape run pattern is valid")
});

const SOFT_LINE_BREAK: &str = "=\r\n";

/// Decode a quoted-printable body.
///
/// A `=` that is not followed by two uppercase hex digits is kept as is.
pub fn decode(input: &str) -> String {
    let expanded = ESCAPE_RUN.replace_all(input, |caps: &Captures| decode_run(&caps[0]));
    expanded.replace(SOFT_LINE_BREAK, "")
}

fn decode_run(run: &str) -> String {
    run.as_bytes()
        .chunks_exact(3)
        .map(|group| char::from((hex_value(group[1]) << 4) | hex_value(group[2])))
        .collect()
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'A'..=b'F' => digit - b'A' + 10,
        // unreachable through ESCAPE_RUN
        _ => 0,
    }
}
