//! Engine error types

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Template error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(vdeploy::template::render))]
pub struct TemplateError {
    /// Error message
    pub message: String,

    /// Template source code
    #[source_code]
    pub src: NamedSource<String>,

    /// Error location in source
    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    /// Line the error was reported on (1-based)
    pub line: Option<usize>,
}

impl TemplateError {
    /// Create a template error from a MiniJinja error
    pub fn from_minijinja(err: minijinja::Error, template_name: &str, template_source: &str) -> Self {
        let line = err.line();
        let message = match err.detail() {
            Some(detail) => format!("{}: {}", err.kind(), detail),
            None => err.to_string(),
        };
        let message = match line {
            Some(line) => format!("{} (line {})", message, line),
            None => message,
        };

        Self {
            message,
            src: NamedSource::new(template_name, template_source.to_string()),
            span: line.and_then(|l| calculate_span(template_source, l)),
            line,
        }
    }
}

/// Byte span covering the given 1-based line
fn calculate_span(source: &str, line: usize) -> Option<SourceSpan> {
    let mut offset = 0;
    for (index, content) in source.split_inclusive('\n').enumerate() {
        if index + 1 == line {
            let len = content.trim_end_matches('\n').len();
            return Some(SourceSpan::new(offset.into(), len));
        }
        offset += content.len();
    }
    None
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_span() {
        let source = "first\nsecond line\nthird";
        let span = calculate_span(source, 2).unwrap();
        assert_eq!(span.offset(), 6);
        assert_eq!(span.len(), 11);
        assert!(calculate_span(source, 10).is_none());
    }
}
