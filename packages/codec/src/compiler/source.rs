//! Line-tracking writer for generated routine source.

const INDENT: &str = "    ";

#[derive(Debug, Default)]
pub(crate) struct SourceWriter {
    text: String,
    lines: usize,
}

impl SourceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line; returns its 1-based line number.
    pub fn line(&mut self, indent: usize, text: impl AsRef<str>) -> usize {
        if self.lines > 0 {
            self.text.push('\n');
        }
        for _ in 0..indent {
            self.text.push_str(INDENT);
        }
        self.text.push_str(text.as_ref());
        self.lines += 1;
        self.lines
    }

    pub fn blank(&mut self) {
        self.line(0, "");
    }

    pub fn finish(self) -> String {
        self.text
    }
}
