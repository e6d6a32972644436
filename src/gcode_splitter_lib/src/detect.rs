use crate::Mm;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::str;

// A G command, then anything but a comment start up to the first Z, which must carry a number.
static Z_MOVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^G[^Z;]+Z(?<Z>-?(?:\d+\.?\d*|\.\d+))").unwrap());

/// The Z height a move line goes to, if it's a move line that sets Z at all.
pub fn detect_z(line: &[u8]) -> Option<Mm> {
    let z_captures = Z_MOVE.captures(line)?;
    str::from_utf8(z_captures.name("Z")?.as_bytes()).ok()?.parse().ok()
}
