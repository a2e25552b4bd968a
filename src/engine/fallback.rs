//! Ordered fallback chains for checkers with a degradation path
//!
//! Each strategy either resolves a snapshot or asks for the next one to be
//! tried. A hard error from any strategy stops the chain.

use tracing::debug;

use crate::engine::error::CheckError;
use crate::model::{Snapshot, keys};

/// Outcome of one strategy attempt
#[derive(Debug)]
pub enum Attempt {
    Resolved(Snapshot),
    /// Try the next strategy, with the reason this one was skipped
    Next(String),
}

/// One way of observing a dependency
#[async_trait::async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self) -> Result<Attempt, CheckError>;
}

/// Strategies tried in order until one resolves
pub struct FallbackChain<'a> {
    strategies: Vec<Box<dyn Strategy + 'a>>,
}

impl<'a> FallbackChain<'a> {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn then(mut self, strategy: impl Strategy + 'a) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Runs the chain, tagging the resolved snapshot with the strategy name
    pub async fn run(&self, url: &str) -> Result<Snapshot, CheckError> {
        let mut reasons = Vec::new();

        for strategy in &self.strategies {
            match strategy.attempt().await? {
                Attempt::Resolved(snapshot) => {
                    debug!("Resolved {} via {}", url, strategy.name());
                    return Ok(snapshot.with_metadata(keys::SOURCE, strategy.name()));
                }
                Attempt::Next(reason) => {
                    debug!("Strategy {} skipped for {}: {}", strategy.name(), url, reason);
                    reasons.push(format!("{}: {}", strategy.name(), reason));
                }
            }
        }

        Err(CheckError::InvalidResponse(format!(
            "no strategy could observe {} ({})",
            url,
            reasons.join("; ")
        )))
    }
}

impl Default for FallbackChain<'_> {
    fn default() -> Self {
        Self::new()
    }
}
