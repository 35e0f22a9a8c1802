//! Terminal output.
//!
//! A restore reports on two channels: information (progress, timings) goes to
//! stdout and errors (diagnostics) go to stderr.

pub mod colors;
pub mod errors;

use colors::ColorSupport;

/// Receiver for restore messages
pub trait Reporter: Send + Sync {
    fn information(&self, message: &str);
    fn error(&self, message: &str);
}

/// Output handler for consistent terminal formatting
pub struct OutputHandler {
    colors: ColorSupport,
}

impl OutputHandler {
    pub fn new() -> Self {
        Self {
            colors: ColorSupport::detect(),
        }
    }

    pub fn info(&self, message: &str) {
        println!("{}", message);
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", self.colors.green("✓"), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.colors.red("✗"), message);
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for OutputHandler {
    fn information(&self, message: &str) {
        self.info(message);
    }

    fn error(&self, message: &str) {
        OutputHandler::error(self, message);
    }
}
