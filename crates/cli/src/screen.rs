//! Screen — the live report surface for follow mode.
//!
//! An alternate-screen buffer erased and redrawn with the report text
//! on every interval, restored on drop. Render failures are swallowed:
//! losing the display must not take ingestion down.

use std::io::{IsTerminal, Write};

use anyhow::bail;
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};

use engine::report::ReportSink;

pub struct Screen {
    out: std::io::Stdout,
}

impl Screen {
    pub fn new() -> anyhow::Result<Self> {
        let mut out = std::io::stdout();
        if !out.is_terminal() {
            bail!("stdout is not a terminal");
        }
        execute!(out, EnterAlternateScreen, Hide)?;
        Ok(Self { out })
    }
}

impl ReportSink for Screen {
    fn render(&mut self, report: &str) {
        if execute!(self.out, Clear(ClearType::All), MoveTo(0, 0)).is_err() {
            return;
        }
        let _ = writeln!(self.out, "{report}");
        let _ = self.out.flush();
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let _ = execute!(self.out, Show, LeaveAlternateScreen);
    }
}
