use super::logger::ErrorWithLocation;
use std::path::PathBuf;
use thiserror::Error;

/// Lines shown above and below the failing line in a code frame
const FRAME_CONTEXT_LINES: usize = 2;

/// A plugin failed for a reason unrelated to the served source.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Plugin error: {message}")]
pub struct PluginError {
    pub message: String,
}

impl PluginError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A plugin could not process a source file because of a syntax error in it.
///
/// `line` and `column` are 1-based.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} ({path}:{line}:{column})", path = .file_path.display())]
pub struct PluginSyntaxError {
    pub message: String,
    pub file_path: PathBuf,
    pub code: String,
    pub line: usize,
    pub column: usize,
}

impl PluginSyntaxError {
    pub fn new(
        message: impl Into<String>,
        file_path: impl Into<PathBuf>,
        code: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            message: message.into(),
            file_path: file_path.into(),
            code: code.into(),
            line,
            column,
        }
    }

    /// The message followed by the failing line and its neighbours, with a caret under the column.
    pub fn code_frame(&self) -> String {
        let mut frame = format!(
            "{}\n  at {}:{}:{}\n",
            self.message,
            self.file_path.display(),
            self.line,
            self.column
        );

        let first = self.line.saturating_sub(FRAME_CONTEXT_LINES).max(1);
        let last = self.line + FRAME_CONTEXT_LINES;
        let width = last.to_string().len();

        for (idx, text) in self.code.lines().enumerate() {
            let number = idx + 1;
            if number < first || number > last {
                continue;
            }

            let marker = if number == self.line { '>' } else { ' ' };
            frame.push_str(&format!("{} {:>width$} | {}\n", marker, number, text, width = width));
            if number == self.line {
                frame.push_str(&format!(
                    "  {:>width$} | {}^\n",
                    "",
                    " ".repeat(self.column.saturating_sub(1)),
                    width = width
                ));
            }
        }

        frame
    }

    pub fn location(&self, browser_path: &str) -> ErrorWithLocation {
        ErrorWithLocation {
            message: self.message.clone(),
            browser_path: browser_path.to_string(),
            file_path: self.file_path.clone(),
            line: self.line,
            column: self.column,
            code_frame: Some(self.code_frame()),
        }
    }
}
