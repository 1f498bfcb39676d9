//! Score fusion
//!
//! Unweighted: the total is the plain sum of the three per-source scores and
//! the conclusion is a pure function of that total.

use repcheck_common::{Conclusion, ScoreTriple};

/// Fused verdict for one address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fusion {
    /// 0-6
    pub total: u8,
    pub conclusion: Conclusion,
}

pub fn fuse(scores: &ScoreTriple) -> Fusion {
    let total = scores.total();
    Fusion {
        total,
        conclusion: Conclusion::from_total(total),
    }
}
