//! Progress sinks for executor batches.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::core::executor::ProgressSink;

/// Terminal progress bar, advanced once per completed task.
pub struct ProgressBarSink {
    bar: ProgressBar,
}

impl ProgressBarSink {
    pub fn new(len: usize, label: &str) -> Self {
        let bar = ProgressBar::new(len as u64);
        bar.set_style(Self::style());
        bar.set_prefix(label.to_string());
        Self { bar }
    }

    /// A bar that never draws; used when stderr is not wanted (`--quiet`).
    pub fn hidden(len: usize) -> Self {
        let bar = ProgressBar::with_draw_target(Some(len as u64), ProgressDrawTarget::hidden());
        Self { bar }
    }

    pub fn style() -> ProgressStyle {
        ProgressStyle::with_template("{prefix:>12} [{bar:40}] {pos}/{len} {elapsed_precise}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for ProgressBarSink {
    fn advance(&self) {
        self.bar.inc(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_bar_counts_advances() {
        let sink = ProgressBarSink::hidden(3);
        sink.advance();
        sink.advance();
        assert_eq!(sink.position(), 2);
        sink.finish();
    }
}
