use std::borrow::Cow;

/// Maximum length (in chars) of a collection name after cleaning.
pub const MAX_NAME_LENGTH: usize = 120;

fn is_stripped_control(c: char) -> bool {
    c == '\u{7f}' || (c.is_ascii_control() && c != '\t' && c != '\n' && c != '\r')
}

/// Remove control characters and ANSI escape sequences from user-supplied text.
///
/// CSI (`ESC [ ... final`) and OSC (`ESC ] ... BEL|ESC \`) sequences are
/// dropped whole; tab, newline and carriage return are kept. Clean input is
/// returned borrowed.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if ('\u{40}'..='\u{7e}').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\u{07}' {
                            break;
                        }
                        if c == '\u{1b}' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
        } else if !is_stripped_control(c) {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Clean a display name: strip control characters, collapse runs of
/// whitespace, trim, and cap at [`MAX_NAME_LENGTH`] chars.
///
/// Returns `None` when nothing printable is left.
pub fn clean_name(name: &str) -> Option<String> {
    let stripped = strip_control_chars(name);
    let collapsed: String = stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_NAME_LENGTH)
        .collect();
    let trimmed = collapsed.trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}
