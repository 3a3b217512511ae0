//! Canonical script text rendering helpers

/// Indentation unit for canonical text
pub const INDENT: &str = "    ";

/// Line-oriented writer with block indentation
#[derive(Debug, Default)]
pub struct TextWriter {
    buf: String,
    depth: usize,
}

impl TextWriter {
    /// Creates an empty writer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one indented line
    pub fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.depth {
            self.buf.push_str(INDENT);
        }
        self.buf.push_str(text.as_ref());
        self.buf.push('\n');
    }

    /// Opens a `header {` block
    pub fn open(&mut self, header: impl AsRef<str>) {
        self.line(format!("{} {{", header.as_ref()));
        self.depth += 1;
    }

    /// Closes the innermost block
    pub fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    /// Closes the innermost block with trailing text after the brace
    pub fn close_with(&mut self, suffix: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(format!("}}{suffix}"));
    }

    /// Increases indentation without writing a brace
    pub fn indent(&mut self) {
        self.depth += 1;
    }

    /// Decreases indentation without writing a brace
    pub fn outdent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Writes `header { ... }` with the closure filling the body
    pub fn block(&mut self, header: impl AsRef<str>, body: impl FnOnce(&mut Self)) {
        self.open(header);
        body(self);
        self.close();
    }

    /// Writes already-dedented free-form text at the current indentation
    pub fn verbatim(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        for line in text.lines() {
            if line.trim().is_empty() {
                self.buf.push('\n');
            } else {
                self.line(line);
            }
        }
    }

    /// Returns the rendered text
    #[must_use]
    pub fn finish(self) -> String {
        self.buf
    }
}

/// Renders a string as a single-quoted literal
#[must_use]
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Normalises raw block text: drops blank edge lines, strips the common
/// indentation and trailing whitespace.
#[must_use]
pub fn dedent(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().map(str::trim_end).collect();
    let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return String::new();
    };
    let last = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(first);
    let body = &lines[first..=last];

    let indent = body
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    body.iter()
        .map(|l| if l.len() >= indent { &l[indent..] } else { l.trim_start() })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("hi"), "'hi'");
        assert_eq!(quote("it's"), "'it\\'s'");
        assert_eq!(quote("a\\b"), "'a\\\\b'");
        assert_eq!(quote("x\ny"), "'x\\ny'");
    }

    #[test]
    fn test_dedent_strips_common_indent() {
        let raw = "\n        def x = 1\n          echo x\n    ";
        assert_eq!(dedent(raw), "def x = 1\n  echo x");
    }

    #[test]
    fn test_dedent_single_line() {
        assert_eq!(dedent(" echo 'x' "), "echo 'x'");
        assert_eq!(dedent("   \n  "), "");
    }

    #[test]
    fn test_writer_blocks() {
        let mut w = TextWriter::new();
        w.block("stages", |w| {
            w.block("stage('a')", |w| w.line("echo('x')"));
        });
        assert_eq!(
            w.finish(),
            "stages {\n    stage('a') {\n        echo('x')\n    }\n}\n"
        );
    }

    #[test]
    fn test_writer_verbatim_reindents() {
        let mut w = TextWriter::new();
        w.block("script", |w| w.verbatim("if (x) {\n    y()\n}"));
        assert_eq!(
            w.finish(),
            "script {\n    if (x) {\n        y()\n    }\n}\n"
        );
    }
}
