//! Attributing converter failures to the generated source.

use crate::converters::{CompiledConverterSet, StepFailure};

/// Builds the diagnostic message for a failed converter step.
///
/// The message names the class and generated method, repeats the original
/// error, and quotes the block of generated source (the lines between blank
/// separators) that contains the failing line.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorContextReporter;

impl ErrorContextReporter {
    /// Annotate `failure`, or `None` if its line can't be located, in which
    /// case the caller should surface the original error as is.
    pub fn annotate(
        &self,
        class_name: &str,
        converters: &CompiledConverterSet,
        failure: &StepFailure,
    ) -> Option<String> {
        let source = converters.source(failure.method);
        let (line, block) = Self::context_block(source, failure.line)?;
        Some(format!(
            "Error in {}#{}: {}\nat line {} in:\n  {}\n",
            class_name, failure.method, failure.error, line, block
        ))
    }

    /// The blank-delimited block containing 1-based `line`, with the line's
    /// position inside that block. Block lines are joined with `"\n  "`.
    pub fn context_block(source: &str, line: usize) -> Option<(usize, String)> {
        let lines: Vec<&str> = source.split('\n').collect();
        if line == 0 || line > lines.len() {
            return None;
        }
        let at = line - 1;

        let start = lines[..at]
            .iter()
            .rposition(|l| l.trim().is_empty())
            .map_or(0, |blank| blank + 1);
        let end = lines[at..]
            .iter()
            .position(|l| l.trim().is_empty())
            .map_or(lines.len(), |blank| at + blank);

        Some((at - start + 1, lines[start..end].join("\n  ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "fn f() {\n    let x = 1;\n\n    match a {\n        None => {}\n        Some(v) => {}\n    }\n\n    x\n}";

    #[test]
    fn block_is_bounded_by_blank_lines() {
        let (pos, block) = ErrorContextReporter::context_block(SOURCE, 6).unwrap();
        assert_eq!(pos, 3);
        assert_eq!(
            block,
            "    match a {\n          None => {}\n          Some(v) => {}\n      }"
        );
    }

    #[test]
    fn first_block_starts_at_top() {
        let (pos, block) = ErrorContextReporter::context_block(SOURCE, 2).unwrap();
        assert_eq!(pos, 2);
        assert_eq!(block, "fn f() {\n      let x = 1;");
    }

    #[test]
    fn last_block_runs_to_end() {
        let (pos, block) = ErrorContextReporter::context_block(SOURCE, 10).unwrap();
        assert_eq!(pos, 2);
        assert_eq!(block, "    x\n  }");
    }

    #[test]
    fn out_of_range_lines_are_unknown() {
        assert!(ErrorContextReporter::context_block(SOURCE, 0).is_none());
        assert!(ErrorContextReporter::context_block(SOURCE, 11).is_none());
    }
}
