//! Per-invocation run options

use crate::config::Config;

/// Flags for a single engine invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Report intended actions without writing files, running SQL or saving state
    pub dry_run: bool,
    /// Log generated SQL and client output
    pub verbose: bool,
    /// Run the rollback path instead of the forward path
    pub rollback: bool,
    /// Explicit rollback target; defaults to the previous version
    pub target_version: Option<u32>,
    /// Force strict mode regardless of configuration
    pub strict: bool,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn rollback(mut self, rollback: bool) -> Self {
        self.rollback = rollback;
        self
    }

    pub fn target(mut self, target_version: Option<u32>) -> Self {
        self.target_version = target_version;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Strict mode is on when requested here or in the configuration
    pub fn strict_enabled(&self, config: &Config) -> bool {
        self.strict || config.strict_mode
    }
}
