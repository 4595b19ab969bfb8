//! Utility helpers for interactive REPL input handling.
//!
//! The main exposed helper is `is_complete_input(input: &str) -> bool` which
//! decides whether the text typed so far can be submitted or if more lines
//! should be read: a `fn` header waits for its `end` line and brackets have to
//! be balanced. Brackets inside strings and comments are ignored.

/// Returns true when `src` looks like a complete REPL submission.
///
/// This is a heuristic (not the assembler) covering the common cases:
/// - every line that starts with `fn` needs a matching `end` line
/// - `(`, `[` and `{` must be closed, ignoring those inside `"..."` strings and
///   after `#` or `//` comments
/// - strings never span lines, an unterminated one is left to the assembler
pub fn is_complete_input(src: &str) -> bool {
    let mut bracket_stack: Vec<char> = Vec::new();
    let mut open_functions = 0usize;

    for line in src.lines() {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("fn") => open_functions += 1,
            Some("end") if words.next().is_none() => {
                // stray `end`, let the assembler report it
                if open_functions == 0 {
                    return true;
                }
                open_functions -= 1;
            }
            _ => {}
        }

        let mut in_string = false;
        let mut escape = false;
        let mut chars = line.chars().peekable();
        while let Some(ch) = chars.next() {
            if in_string {
                if escape {
                    escape = false;
                } else if ch == '\\' {
                    escape = true;
                } else if ch == '"' {
                    in_string = false;
                }
                continue;
            }
            match ch {
                '"' => in_string = true,
                '#' => break,
                '/' if chars.peek() == Some(&'/') => break,
                '(' => bracket_stack.push(')'),
                '[' => bracket_stack.push(']'),
                '{' => bracket_stack.push('}'),
                ')' | ']' | '}' => {
                    // mismatched or extra closing bracket: submit so the error is reported
                    if bracket_stack.pop() != Some(ch) {
                        return true;
                    }
                }
                _ => {}
            }
        }
    }

    open_functions == 0 && bracket_stack.is_empty()
}
