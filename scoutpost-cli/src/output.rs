//! Output formatting abstraction for text vs JSON rendering
//!
//! All subcommand output flows through [`OutputWriter`] which handles format switching.
//! This keeps format-specific logic out of command handlers entirely.

use std::io::Write;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Abstraction for writing CLI output in different formats.
///
/// Subcommand handlers call `writer.render(&payload)` where `payload`
/// implements both `Serialize` (for JSON) and `Render` (for text).
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    /// Create a new output writer with the specified format.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render a payload to stdout.
    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render_to(&mut handle, payload)
    }

    /// Render a payload to an arbitrary writer.
    ///
    /// For `Text` format, delegates to `Render::render_text()`.
    /// For `Json` format, serialises via `serde_json`.
    pub fn render_to<T: Render + Serialize>(
        &self,
        w: &mut dyn Write,
        payload: &T,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => {
                payload.render_text(w)?;
            }
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

/// Trait for human-readable text rendering.
///
/// Implemented by every CLI output payload alongside `serde::Serialize`.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct TestPayload {
        owner: String,
        count: u32,
        note: Option<String>,
    }

    impl Render for TestPayload {
        fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
            writeln!(w, "Owner: {}", self.owner)?;
            writeln!(w, "Count: {}", self.count)?;
            Ok(())
        }
    }

    fn payload() -> TestPayload {
        TestPayload {
            owner: "alice".to_owned(),
            count: 42,
            note: None,
        }
    }

    fn rendered(format: OutputFormat) -> String {
        let mut buffer = Vec::new();
        OutputWriter::new(format)
            .render_to(&mut buffer, &payload())
            .expect("rendering should succeed");
        String::from_utf8(buffer).expect("valid UTF-8")
    }

    #[test]
    fn test_output_writer_text_format() {
        let output = rendered(OutputFormat::Text);
        assert!(output.contains("Owner: alice"));
        assert!(output.contains("Count: 42"));
    }

    #[test]
    fn test_output_writer_json_format() {
        let output = rendered(OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&output).expect("should parse JSON");
        assert_eq!(parsed["owner"].as_str(), Some("alice"));
        assert_eq!(parsed["count"].as_u64(), Some(42));
        assert!(parsed["note"].is_null(), "None should be null in JSON");
    }

    #[test]
    fn test_output_writer_json_is_pretty_and_newline_terminated() {
        let output = rendered(OutputFormat::Json);
        assert!(output.contains("\n  "), "pretty JSON should be indented");
        assert!(output.ends_with('\n'));
    }
}
