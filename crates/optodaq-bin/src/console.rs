//! Terminal presentation: operator prompts and progress lines.

use optodaq_core::FrameBuffer;
use optodaq_experiment::{OperatorPrompt, Progress, PromptKind, PromptResponse, PublishedFrame};
use std::io::{BufRead, Write};
use tracing::{info, warn};

/// OK/Cancel prompt on stdin. Empty input, `y`, `yes` and `ok` proceed.
pub struct ConsolePrompt {
    assume_yes: bool,
}

impl ConsolePrompt {
    /// With `assume_yes` every prompt is answered without reading stdin.
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    fn read_answer(prompt: PromptKind) -> std::io::Result<String> {
        let mut stderr = std::io::stderr().lock();
        write!(stderr, "[{}] {} [Y/n] ", prompt.title(), prompt.message())?;
        stderr.flush()?;

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    }
}

impl OperatorPrompt for ConsolePrompt {
    fn confirm(&self, prompt: PromptKind) -> PromptResponse {
        if self.assume_yes {
            info!(prompt = prompt.title(), "Prompt confirmed automatically");
            return PromptResponse::Proceed;
        }
        match Self::read_answer(prompt) {
            Ok(line) => parse_answer(&line),
            Err(e) => {
                warn!(prompt = prompt.title(), error = %e, "Could not read answer");
                PromptResponse::Cancel
            }
        }
    }
}

fn parse_answer(line: &str) -> PromptResponse {
    match line.trim().to_lowercase().as_str() {
        "" | "y" | "yes" | "ok" => PromptResponse::Proceed,
        _ => PromptResponse::Cancel,
    }
}

/// One line per notification.
pub fn progress_line(note: &Progress, frame: Option<&PublishedFrame>) -> String {
    let step = note.step.to_string();
    match frame {
        Some(frame) => {
            let superseded = if frame.seq == note.seq {
                ""
            } else {
                "  (superseded)"
            };
            format!(
                "{:>4}  {:<10} {}{}",
                note.seq,
                step,
                stats_line(&frame.buffer),
                superseded
            )
        }
        None => format!("{:>4}  {:<10} (no frame)", note.seq, step),
    }
}

/// `min / mean / max` of a frame.
pub fn stats_line(buffer: &FrameBuffer) -> String {
    let stats = buffer.stats();
    format!(
        "min {:>7}  mean {:>9.1}  max {:>7}  [{}x{}]",
        stats.min,
        stats.mean,
        stats.max,
        buffer.width(),
        buffer.height()
    )
}
