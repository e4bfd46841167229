// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON-lines output modes.

use serde::Serialize;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

impl OutputMode {
    /// JSON wins over quiet when both flags are given.
    pub fn from_flags(quiet: bool, json: bool) -> Self {
        match (quiet, json) {
            (_, true) => OutputMode::Json,
            (true, false) => OutputMode::Quiet,
            (false, false) => OutputMode::Normal,
        }
    }
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a warning. Quiet mode still shows warnings.
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Warning: {message}"),
            OutputMode::Json => emit_stderr(&event_line("warning", message, None)),
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => emit_stdout(&event_line("success", message, self.duration())),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => emit_stderr(&event_line("error", message, self.duration())),
        }
    }

    /// Print a block of text verbatim, such as a diagnostic dump.
    ///
    /// Goes to stderr so it never mixes with machine-readable stdout.
    pub fn detail(&self, text: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("{text}"),
            OutputMode::Json => emit_stderr(&event_line("detail", text, None)),
        }
    }

    /// Print a structured result: pretty text through `render` for humans,
    /// one JSON object in JSON mode.
    pub fn report<T: Serialize>(&self, value: &T, render: impl FnOnce(&T) -> String) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => println!("{}", render(value)),
            OutputMode::Json => match serde_json::to_string(value) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::warn!("failed to encode report: {}", e),
            },
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

fn event_line(event: &str, message: &str, duration_secs: Option<f64>) -> Option<String> {
    serde_json::to_string(&JsonEvent {
        event,
        message,
        duration_secs,
    })
    .ok()
}

fn emit_stdout(line: &Option<String>) {
    if let Some(line) = line {
        println!("{line}");
    }
}

fn emit_stderr(line: &Option<String>) {
    if let Some(line) = line {
        eprintln!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_wins_over_quiet() {
        assert_eq!(OutputMode::from_flags(true, true), OutputMode::Json);
        assert_eq!(OutputMode::from_flags(true, false), OutputMode::Quiet);
        assert_eq!(OutputMode::from_flags(false, false), OutputMode::Normal);
    }

    #[test]
    fn event_lines_omit_missing_duration() {
        let line = event_line("warning", "stage logging has nothing to apply", None).unwrap();
        assert_eq!(
            line,
            r#"{"event":"warning","message":"stage logging has nothing to apply"}"#
        );
        let line = event_line("success", "done", Some(1.5)).unwrap();
        assert!(line.contains(r#""duration_secs":1.5"#));
    }
}
