//! Source handling and the s-expression reader which produces the AST consumed
//! by code generation.

use std::path::PathBuf;

use colored::Colorize;

use self::lexer::Span;

pub mod ast;
pub mod intern;
pub mod lexer;
pub mod reader;

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn from_memory(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            origin: SourceFileOrigin::Memory,
        }
    }

    pub fn value_of_span(&self, span: Span) -> &str {
        &self.contents[span.start..span.end]
    }

    /// 1-based line number of a byte offset
    pub fn row_for_position(&self, position: usize) -> usize {
        self.contents[..position.min(self.contents.len())]
            .matches('\n')
            .count()
            + 1
    }

    /// 1-based column of a byte offset
    pub fn column_for_position(&self, position: usize) -> usize {
        let position = position.min(self.contents.len());
        let line_start = self.contents[..position]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);

        position - line_start + 1
    }

    pub fn format_span_position(&self, span: Span) -> String {
        format!(
            "{}:{}:{}",
            self.origin,
            self.row_for_position(span.start),
            self.column_for_position(span.start)
        )
    }

    /// Prints the line containing the span with the offending range underlined
    pub fn highlight_span(&self, span: Span) {
        let row = self.row_for_position(span.start);
        let column = self.column_for_position(span.start);
        let Some(line) = self.contents.lines().nth(row - 1) else {
            return;
        };

        let width = span
            .end
            .saturating_sub(span.start)
            .clamp(1, line.len().saturating_sub(column - 1).max(1));
        let gutter = row.to_string();

        eprintln!("{} {} {}", gutter.blue(), "|".blue(), line);
        eprintln!(
            "{} {} {}{}",
            " ".repeat(gutter.len()),
            "|".blue(),
            " ".repeat(column - 1),
            "^".repeat(width).red()
        );
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based() {
        let source = SourceFile::from_memory("(define x 1)\n(car x)");

        assert_eq!(source.row_for_position(0), 1);
        assert_eq!(source.column_for_position(0), 1);
        assert_eq!(source.row_for_position(14), 2);
        assert_eq!(source.column_for_position(14), 2);
        assert_eq!(
            source.format_span_position(Span::new(14, 17)),
            "<memory>:2:2"
        );
    }
}
