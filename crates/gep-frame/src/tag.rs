//! Tag construction and pretty-printing.
//!
//! A tag is four bytes packed big-endian, conventionally printable ASCII
//! (`make_tag(b"cmd1")`). The core compares tags for equality only.

use std::fmt::Write as _;

/// Pack four bytes into a tag, first byte most significant.
pub const fn make_tag(bytes: &[u8; 4]) -> u32 {
    ((bytes[0] as u32) << 24) | ((bytes[1] as u32) << 16) | ((bytes[2] as u32) << 8) | (bytes[3] as u32)
}

/// Render a tag for log output.
///
/// Printable ASCII bytes pass through; anything else is escaped as
/// `\xNN`, so `make_tag(b"cmd1")` prints as `cmd1` and a garbage tag
/// stays legible.
pub fn tag_string(tag: u32) -> String {
    let bytes = tag.to_be_bytes();
    let mut out = String::with_capacity(16);
    for b in bytes {
        if b.is_ascii_graphic() || b == b' ' {
            out.push(b as char);
        } else {
            // `write!` to a String cannot fail
            let _ = write!(out, "\\x{b:02x}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_tag_packs_big_endian() {
        assert_eq!(make_tag(b"cmd1"), 0x636d_6431);
        assert_eq!(make_tag(b"gepp"), 0x6765_7070);
    }

    #[test]
    fn tag_string_printable() {
        assert_eq!(tag_string(make_tag(b"cmd1")), "cmd1");
        assert_eq!(tag_string(make_tag(b"xyza")), "xyza");
    }

    #[test]
    fn tag_string_escapes_unprintable() {
        assert_eq!(tag_string(0x636d_6400), "cmd\\x00");
        assert_eq!(tag_string(0xffff_ffff), "\\xff\\xff\\xff\\xff");
    }
}
