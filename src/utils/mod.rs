// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bio::stats::{LogProb, PHREDProb};
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};

pub(crate) mod stats;

/// Tolerance for capping numerical overshoots of probabilities beyond 1.0.
pub(crate) const NUMERICAL_EPSILON: f64 = 1e-3;

/// Tolerance within which a posterior distribution has to sum to one.
pub const PROB_SUM_TOLERANCE: f64 = 1e-6;

/// Maximum reported PHRED score. Scores are clipped here to avoid infinities
/// when the complementary probability underflows.
pub const MAX_PHRED: f64 = 200.0;

/// PHRED-scaled confidence for an event with probability `p`, defined as
/// `-10 log10(1 - p)`. Higher scores mean more confident calls.
///
/// Construction goes through log-space probabilities; scores are clipped to
/// `[0, MAX_PHRED]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Phred(NotNan<f64>);

impl Phred {
    pub fn new(score: f64) -> Self {
        let score = score.max(0.0).min(MAX_PHRED);
        Phred(NotNan::new(score).expect("bug: NaN PHRED score"))
    }

    /// Score from the log-probability that the call is wrong. Slight
    /// numerical overshoots beyond probability one are capped.
    pub fn from_log_error_prob(prob: LogProb) -> Self {
        let prob = prob.cap_numerical_overshoot(NUMERICAL_EPSILON);
        Phred::new(*PHREDProb::from(prob))
    }

    /// Score from the log-probability that the call is right.
    pub fn from_log_prob(prob: LogProb) -> Self {
        Phred::from_log_error_prob(prob.ln_one_minus_exp())
    }

    pub fn score(&self) -> f64 {
        self.0.into_inner()
    }

    /// The log-probability that the call is wrong.
    pub fn log_error_prob(&self) -> LogProb {
        LogProb::from(PHREDProb(self.score()))
    }

    /// The linear probability that the call is right.
    pub fn probability_true(&self) -> f64 {
        1.0 - self.log_error_prob().exp()
    }
}

impl fmt::Display for Phred {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.2}", self.score())
    }
}

/// Cooperative cancellation flag, shared between the driver and region
/// workers. Checked between pipeline stages and at each variational
/// iteration; a cancelled region yields no partial output.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
