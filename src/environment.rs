//! Sandbox/live mode and the per-mode active HIT counters.
use crate::services::{HitFilter, Marketplace};
use std::fmt;

/// Marketplace environment. Ids and counts never cross between modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    Sandbox,
    Live,
}

impl Mode {
    pub fn from_sandbox_flag(using_sandbox: bool) -> Self {
        if using_sandbox {
            Mode::Sandbox
        } else {
            Mode::Live
        }
    }

    pub fn is_sandbox(&self) -> bool {
        matches!(self, Mode::Sandbox)
    }

    pub fn other(&self) -> Self {
        match self {
            Mode::Sandbox => Mode::Live,
            Mode::Live => Mode::Sandbox,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Sandbox => "sandbox",
            Mode::Live => "live",
        }
    }

    /// Short label used in the console prompt.
    pub fn prompt_label(&self) -> &'static str {
        match self {
            Mode::Sandbox => "sdbx",
            Mode::Live => "live",
        }
    }

    fn index(&self) -> usize {
        match self {
            Mode::Sandbox => 0,
            Mode::Live => 1,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-wide mode flag plus one active HIT counter per mode.
///
/// Counters are never persisted. Every mutation targets the current mode's
/// counter only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentState {
    mode: Mode,
    hit_counts: [usize; 2],
}

impl EnvironmentState {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            hit_counts: [0, 0],
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn hit_count(&self, mode: Mode) -> usize {
        self.hit_counts[mode.index()]
    }

    pub fn current_count(&self) -> usize {
        self.hit_count(self.mode)
    }

    /// Switch to `target`, or to the other mode when no target is given.
    ///
    /// The marketplace is repointed before the tally so the refreshed
    /// counter always comes from the new mode's endpoint.
    pub fn switch_mode(&mut self, target: Option<Mode>, marketplace: &mut dyn Marketplace) -> Mode {
        let next = target.unwrap_or_else(|| self.mode.other());
        self.mode = next;
        marketplace.set_mode(next);
        self.tally(marketplace);
        tracing::info!(mode = %next, count = self.current_count(), "mode switched");
        next
    }

    /// Refresh the current mode's counter from the marketplace.
    ///
    /// A failed query keeps the previous value instead of showing zero.
    pub fn tally(&mut self, marketplace: &dyn Marketplace) -> usize {
        match marketplace.list_hits(HitFilter::Active) {
            Ok(hits) => self.hit_counts[self.mode.index()] = hits.len(),
            Err(err) => {
                tracing::warn!(mode = %self.mode, error = %format!("{err:#}"), "tally failed; keeping previous count");
            }
        }
        self.current_count()
    }

    pub fn record_created(&mut self) {
        self.hit_counts[self.mode.index()] += 1;
    }

    pub fn record_expired(&mut self) {
        let count = &mut self.hit_counts[self.mode.index()];
        *count = count.saturating_sub(1);
    }
}
