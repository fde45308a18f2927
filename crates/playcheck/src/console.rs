use invocation::OutputSink;
use std::io::Write;

/// Echoes tool output to the terminal as it arrives
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn stdout_line(&mut self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }

    fn stderr_line(&mut self, line: &str) {
        eprintln!("{line}");
    }
}
