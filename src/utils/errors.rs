use crate::dev_server::{PluginError, PluginSyntaxError};
use std::path::PathBuf;
use thiserror::Error;

/// Enhanced error with file location context
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub code_snippet: Option<String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            file_path: None,
            line: None,
            column: None,
            code_snippet: None,
        }
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_location(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn with_snippet(mut self, snippet: String) -> Self {
        self.code_snippet = Some(snippet);
        self
    }
}

#[derive(Error, Debug)]
pub enum DevkitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {message}")]
    Parse {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Build error: {message}")]
    Build {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Could not resolve \"{specifier}\"{}", importer_suffix(.importer))]
    Resolve {
        specifier: String,
        importer: Option<PathBuf>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    PluginSyntax(#[from] PluginSyntaxError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl DevkitError {
    /// Create a simple parse error without context
    pub fn parse(message: String) -> Self {
        Self::Parse {
            message,
            context: None,
        }
    }

    /// Create a parse error with context
    pub fn parse_with_context(message: String, context: ErrorContext) -> Self {
        Self::Parse {
            message,
            context: Some(context),
        }
    }

    /// Create a simple build error without context
    pub fn build(message: String) -> Self {
        Self::Build {
            message,
            context: None,
        }
    }

    /// Create a configuration error
    pub fn config(message: String) -> Self {
        Self::Config(message)
    }

    pub fn resolve(specifier: &str, importer: Option<PathBuf>) -> Self {
        Self::Resolve {
            specifier: specifier.to_string(),
            importer,
        }
    }

    /// Format error with enhanced context display
    pub fn format_detailed(&self) -> String {
        match self {
            DevkitError::Parse { message, context } => {
                self.format_error_with_context("Parse Error", message, context)
            }
            DevkitError::Build { message, context } => {
                self.format_error_with_context("Build Error", message, context)
            }
            DevkitError::PluginSyntax(err) => err.code_frame(),
            _ => self.to_string(),
        }
    }

    fn format_error_with_context(
        &self,
        error_type: &str,
        message: &str,
        context: &Option<ErrorContext>,
    ) -> String {
        let mut output = format!("❌ {}: {}", error_type, message);

        if let Some(ctx) = context {
            if let Some(ref file_path) = ctx.file_path {
                output.push_str(&format!("\n📁 File: {}", file_path.display()));
            }

            if let (Some(line), Some(column)) = (ctx.line, ctx.column) {
                output.push_str(&format!("\n📍 Location: line {}, column {}", line, column));
            }

            if let Some(ref snippet) = ctx.code_snippet {
                output.push_str(&format!(
                    "\n📝 Code:\n{}",
                    format_code_snippet(snippet, ctx.line)
                ));
            }
        }

        output
    }
}

fn importer_suffix(importer: &Option<PathBuf>) -> String {
    importer
        .as_ref()
        .map(|p| format!(" from {}", p.display()))
        .unwrap_or_default()
}

/// Render a numbered snippet, pointing at `error_line` (1-based) when given.
pub fn format_code_snippet(snippet: &str, error_line: Option<usize>) -> String {
    let mut output = String::new();

    for (i, line) in snippet.lines().enumerate() {
        let line_num = i + 1;

        if error_line == Some(line_num) {
            output.push_str(&format!("→ {:3} │ {}\n", line_num, line));
            output.push_str(&format!("     │ {}\n", "^^^".repeat(line.len().min(20))));
        } else {
            output.push_str(&format!("  {:3} │ {}\n", line_num, line));
        }
    }

    output
}

pub type Result<T> = std::result::Result<T, DevkitError>;

impl From<regex::Error> for DevkitError {
    fn from(err: regex::Error) -> Self {
        DevkitError::parse(format!("Regex error: {}", err))
    }
}

impl From<anyhow::Error> for DevkitError {
    fn from(err: anyhow::Error) -> Self {
        DevkitError::build(err.to_string())
    }
}
