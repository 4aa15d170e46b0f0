//! Line-oriented output buffer for generated Lua.
//!
//! [`CodeWriter`] records lines together with their nesting level so that a
//! translated function body can be spliced into the scaffolding around it
//! (dispatch loop, protected region, method assignment) at any depth and
//! rendered once at the end with the configured indentation.

/// Buffered lines with relative indentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeWriter {
    lines: Vec<(usize, String)>,
    level: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current nesting level.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn indent(&mut self) {
        self.level += 1;
    }

    pub fn dedent(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    /// Append one line at the current level.
    pub fn line(&mut self, text: impl Into<String>) {
        self.lines.push((self.level, text.into()));
    }

    /// Append every line of `other`, nested under the current level.
    pub fn append(&mut self, other: CodeWriter) {
        let base = self.level;
        self.lines
            .extend(other.lines.into_iter().map(|(level, text)| (base + level, text)));
    }

    /// Append multi-line text produced elsewhere (e.g. a function literal),
    /// keeping its relative indentation markers.
    pub fn append_block(&mut self, block: &[(usize, String)]) {
        let base = self.level;
        self.lines
            .extend(block.iter().map(|(level, text)| (base + level, text.clone())));
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// The raw `(level, text)` pairs.
    pub fn lines(&self) -> &[(usize, String)] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<(usize, String)> {
        self.lines
    }

    /// Rewrite every line in place, stopping at the first error.
    pub fn try_map<E>(&mut self, mut f: impl FnMut(&str) -> Result<String, E>) -> Result<(), E> {
        for (_, text) in &mut self.lines {
            *text = f(text)?;
        }
        Ok(())
    }

    /// Render with `indent` per level, or flush-left when `minify` is set.
    ///
    /// A line holding pre-rendered multi-line text (a function literal) has
    /// every one of its lines indented to the line's level.
    pub fn render(&self, indent: &str, minify: bool) -> String {
        let mut out = String::new();
        for (level, text) in &self.lines {
            for piece in text.split('\n') {
                if !minify {
                    for _ in 0..*level {
                        out.push_str(indent);
                    }
                }
                out.push_str(piece);
                out.push('\n');
            }
        }
        out
    }
}

/// Whether `text` can be used as an operand without parentheses: no
/// top-level spaces or operators outside brackets and string literals.
pub fn is_atomic(text: &str) -> bool {
    if text.is_empty() || text.starts_with(['-', '#', '{']) {
        return false;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for ch in text.chars() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            c if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == ':' => {}
            _ => return false,
        }
    }
    !in_string && depth == 0
}

/// `text` as a binary operand.
pub fn operand(text: &str) -> String {
    if is_atomic(text) {
        text.to_string()
    } else {
        format!("({text})")
    }
}

/// `text` as the prefix of an index, field access or method call. Lua only
/// allows names, calls and parenthesized expressions there.
pub fn prefix(text: &str) -> String {
    let starts_ok = text
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '(');
    if starts_ok && is_atomic(text) && !matches!(text, "nil" | "true" | "false") {
        text.to_string()
    } else {
        format!("({text})")
    }
}

/// Quote a byte string as a Lua string literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for byte in value.bytes() {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\{byte:03}")),
        }
    }
    out.push('"');
    out
}
