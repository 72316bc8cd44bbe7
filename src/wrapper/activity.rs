//! Activity hashing (§4.6, §9 Testable property: "must not alias on color
//! changes alone"). Feeds a raw `tmux capture-pane -e` dump through an
//! `avt::Vt` so the hash is over rendered cell contents rather than the raw
//! escape-sequence bytes — grounded in groblegark-coop's `Screen::feed` /
//! `Screen::snapshot` (`crates/cli/src/screen.rs`), simplified to a single
//! one-shot feed since the wrapper captures a whole-screen snapshot each
//! tick instead of streaming PTY bytes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const VT_COLS: usize = 220;
const VT_ROWS: usize = 50;

/// Hash the *rendered* terminal contents of a raw capture, ignoring SGR
/// attributes (color, bold, etc.) entirely — two frames that only differ in
/// color produce the same hash, satisfying the "no alias on color alone"
/// property from the other direction: color changes alone never register as
/// activity.
pub fn screen_hash(raw_capture: &str) -> u64 {
    let mut vt = avt::Vt::new(VT_COLS, VT_ROWS);
    vt.feed_str(raw_capture);
    let mut hasher = DefaultHasher::new();
    for line in vt.view() {
        line.text().hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_only_change_does_not_alias() {
        let plain = "hello world";
        let colored = "\x1b[31mhello world\x1b[0m";
        assert_eq!(screen_hash(plain), screen_hash(colored));
    }

    #[test]
    fn text_change_produces_different_hash() {
        let a = screen_hash("state: idle");
        let b = screen_hash("state: busy");
        assert_ne!(a, b);
    }
}
