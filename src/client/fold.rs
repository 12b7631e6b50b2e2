//! Allocation-free ASCII case-insensitive search.
//!
//! Used to find `Content-Length`, `Transfer-Encoding: chunked`, and
//! `Connection: close` in a raw response buffer without allocating an
//! uppercased copy of either side.

/// Case-insensitive byte equality that does NOT fold control
/// characters or punctuation that happens to sit 0x20 away from a
/// letter (`@`/`` ` ``, `[`/`{`, `\`/`|`, `]`/`}`, `^`/`~`, `_`/DEL,
/// `\n`/`*`). Two bytes fold equal only if they are the same byte or
/// an uppercase/lowercase pair of the same ASCII letter.
#[inline]
pub fn byte_fold_eq(a: u8, b: u8) -> bool {
    if a == b {
        return true;
    }
    if a ^ b != 0x20 {
        return false;
    }
    let lower = if a > b { a } else { b };
    lower.is_ascii_lowercase()
}

/// Find the first occurrence of `needle` in `haystack`, comparing
/// bytes case-insensitively per [`byte_fold_eq`]. Returns the byte
/// offset of the match, or `None`.
pub fn fold_find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return if needle.is_empty() { Some(0) } else { None };
    }
    'outer: for start in 0..=(haystack.len() - needle.len()) {
        for (i, &nb) in needle.iter().enumerate() {
            if !byte_fold_eq(haystack[start + i], nb) {
                continue 'outer;
            }
        }
        return Some(start);
    }
    None
}
