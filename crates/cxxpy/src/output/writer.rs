//! Indentation and blank-line bookkeeping for significant-whitespace output.

/// Line-oriented text buffer.
///
/// Content is written inline; indentation is applied lazily on the first
/// write of each line. Blank lines are only ever requested, never written
/// directly: the request is honoured when the next content arrives, except
/// at the start of the file or directly after a block opens.
#[derive(Debug, Default)]
pub struct CodeWriter {
    output: String,
    depth: usize,
    /// The current line has content and no newline yet.
    line_open: bool,
    /// Blank lines to emit before the next content.
    pending_blanks: usize,
    /// Nothing has been written since the last `start_block`.
    block_start: bool,
}

const INDENT: &str = "    ";

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append inline content, starting an indented line if needed.
    pub fn write(&mut self, content: &str) {
        if content.is_empty() {
            return;
        }
        if !self.line_open {
            if !self.output.is_empty() && !self.block_start {
                for _ in 0..self.pending_blanks {
                    self.output.push('\n');
                }
            }
            for _ in 0..self.depth {
                self.output.push_str(INDENT);
            }
            self.pending_blanks = 0;
            self.block_start = false;
            self.line_open = true;
        }
        self.output.push_str(content);
    }

    /// Write `content` as a complete line.
    pub fn line(&mut self, content: &str) {
        self.write(content);
        self.clear_line();
    }

    /// End the current line if it has content.
    pub fn clear_line(&mut self) {
        if self.line_open {
            self.output.push('\n');
            self.line_open = false;
        }
    }

    /// At least one blank line before the next content.
    pub fn clear_minor_block(&mut self) {
        self.clear_line();
        self.pending_blanks = self.pending_blanks.max(1);
    }

    /// Two blank lines before the next top-level content, one when nested.
    pub fn clear_major_block(&mut self) {
        self.clear_line();
        let blanks = if self.depth == 0 { 2 } else { 1 };
        self.pending_blanks = self.pending_blanks.max(blanks);
    }

    /// Indent subsequent lines one level.
    pub fn start_block(&mut self) {
        self.clear_line();
        self.depth += 1;
        self.pending_blanks = 0;
        self.block_start = true;
    }

    pub fn end_block(&mut self) {
        self.clear_line();
        self.depth = self.depth.saturating_sub(1);
        self.pending_blanks = 0;
        self.block_start = false;
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether the current block has had no content yet.
    pub fn at_block_start(&self) -> bool {
        self.block_start
    }

    pub fn finish(mut self) -> String {
        self.clear_line();
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_blank_lines_at_file_start() {
        let mut w = CodeWriter::new();
        w.clear_major_block();
        w.line("x = 1");
        assert_eq!(w.finish(), "x = 1\n");
    }

    #[test]
    fn major_block_depends_on_depth() {
        let mut w = CodeWriter::new();
        w.line("class A:");
        w.start_block();
        w.clear_major_block();
        w.line("x = 1");
        w.clear_major_block();
        w.line("y = 2");
        w.end_block();
        w.clear_major_block();
        w.line("z = 3");
        assert_eq!(w.finish(), "class A:\n    x = 1\n\n    y = 2\n\n\nz = 3\n");
    }

    #[test]
    fn requests_do_not_accumulate() {
        let mut w = CodeWriter::new();
        w.line("a");
        w.clear_minor_block();
        w.clear_minor_block();
        w.clear_major_block();
        w.line("b");
        assert_eq!(w.finish(), "a\n\n\nb\n");
    }

    #[test]
    fn inline_writes_share_a_line() {
        let mut w = CodeWriter::new();
        w.write("def f(");
        w.write("x");
        w.write("):");
        w.start_block();
        w.line("return x");
        w.end_block();
        assert_eq!(w.finish(), "def f(x):\n    return x\n");
    }
}
