//! Match result
//!
//! Built once when the match reaches its terminal phase, either by a team
//! reaching the score limit or by the opponent leaving early.

use serde::Serialize;

use crate::game::entities::Team;

/// Match result information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub winner: Team,
    pub reason: MatchEndReason,
    /// Final score per team index
    pub scores: [u32; 2],
}

/// Reason why match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchEndReason {
    /// The winner reached the score limit
    ScoreLimit,
    /// The other peer left before the match was over; each remaining peer
    /// declares its own team the winner
    Forfeit,
}

impl MatchResult {
    pub fn score_limit(winner: Team, scores: [u32; 2]) -> Self {
        Self {
            winner,
            reason: MatchEndReason::ScoreLimit,
            scores,
        }
    }

    pub fn forfeit(local_team: Team, scores: [u32; 2]) -> Self {
        Self {
            winner: local_team,
            reason: MatchEndReason::Forfeit,
            scores,
        }
    }

    /// Whether the win indicator for `team` is shown
    pub fn is_win_for(&self, team: Team) -> bool {
        self.winner == team
    }

    pub fn winner_score(&self) -> u32 {
        self.scores[self.winner.index()]
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        let reason = match self.reason {
            MatchEndReason::ScoreLimit => "score limit",
            MatchEndReason::Forfeit => "forfeit",
        };
        format!(
            "{:?} wins {}-{} ({})",
            self.winner, self.scores[0], self.scores[1], reason
        )
    }
}
