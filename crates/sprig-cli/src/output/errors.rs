//! Error formatting with hints and the source chain.

use sprig_core::error::SprigError;
use std::error::Error;

use super::colors::ColorSupport;

/// Renders infrastructure errors for the terminal
pub struct ErrorFormatter {
    colors: ColorSupport,
}

impl ErrorFormatter {
    pub fn new(colors: ColorSupport) -> Self {
        Self { colors }
    }

    /// Error message, then the suggestion and every underlying cause
    pub fn format_error(&self, error: &SprigError) -> String {
        let mut output = String::new();

        output.push_str(&self.colors.red("error"));
        output.push_str(": ");
        output.push_str(&error.to_string());

        if let Some(suggestion) = error.suggestion() {
            output.push('\n');
            output.push_str(&self.colors.dim("help"));
            output.push_str(": ");
            output.push_str(suggestion);
        }

        let mut source = error.source();
        while let Some(err) = source {
            output.push('\n');
            output.push_str(&self.colors.dim("caused by"));
            output.push_str(": ");
            output.push_str(&err.to_string());
            source = err.source();
        }

        output
    }
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        Self::new(ColorSupport::detect())
    }
}
