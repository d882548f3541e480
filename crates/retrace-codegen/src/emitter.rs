//! Indented line writer for generated TypeScript.

/// Accumulates source text with two-space block indentation.
#[derive(Debug, Default)]
pub struct Emitter {
    out: String,
    indent: usize,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one line at the current indentation.
    pub fn line(&mut self, s: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Writes `head {` and indents.
    pub fn open_block(&mut self, head: &str) {
        if head.is_empty() {
            self.line("{");
        } else {
            self.line(&format!("{head} {{"));
        }
        self.indent();
    }

    pub fn close_block(&mut self) {
        self.dedent();
        self.line("}");
    }

    /// Dedents, writes `} head {` and indents again.
    pub fn continue_block(&mut self, head: &str) {
        self.dedent();
        self.line(&format!("}} {head} {{"));
        self.indent();
    }

    /// Appends pre-formatted text verbatim.
    pub fn push_str(&mut self, s: &str) {
        self.out.push_str(s);
    }

    pub fn finish(self) -> String {
        self.out
    }
}
