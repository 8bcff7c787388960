//! # Oracle Adapter
//!
//! Read-only numeric delivery-quality feed. The engine only reads the
//! latest value for `getOracleData`; delivery outcome is reported by the
//! oracle identity through `updateDeliveryStatus`, not pulled from here.

use parking_lot::RwLock;
use thiserror::Error;

/// The feed could not produce a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle feed unavailable: {0}")]
    Unavailable(String),
}

/// A numeric data feed.
pub trait OracleFeed: Send + Sync {
    fn latest_value(&self) -> Result<i128, OracleError>;
}

/// A settable in-process feed, used in simulations and tests.
#[derive(Debug, Default)]
pub struct MockOracle {
    answer: RwLock<Option<i128>>,
}

impl MockOracle {
    /// A feed that already holds `answer`.
    pub fn with_answer(answer: i128) -> Self {
        Self {
            answer: RwLock::new(Some(answer)),
        }
    }

    pub fn set_latest_answer(&self, answer: i128) {
        *self.answer.write() = Some(answer);
    }

    /// Forget the current answer; subsequent reads fail.
    pub fn clear(&self) {
        *self.answer.write() = None;
    }
}

impl OracleFeed for MockOracle {
    fn latest_value(&self) -> Result<i128, OracleError> {
        self.answer
            .read()
            .ok_or_else(|| OracleError::Unavailable("no answer has been published".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_feed_is_unavailable() {
        let feed = MockOracle::default();
        assert!(matches!(feed.latest_value(), Err(OracleError::Unavailable(_))));
    }

    #[test]
    fn latest_answer_wins() {
        let feed = MockOracle::with_answer(100);
        feed.set_latest_answer(900);
        assert_eq!(feed.latest_value().unwrap(), 900);
        feed.set_latest_answer(-5);
        assert_eq!(feed.latest_value().unwrap(), -5);
    }

    #[test]
    fn clear_resets() {
        let feed = MockOracle::with_answer(1);
        feed.clear();
        assert!(feed.latest_value().is_err());
    }
}
