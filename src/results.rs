//! Round results and running tournament statistics

use serde::{Deserialize, Serialize};

use crate::game::Outcome;

/// Score column placeholder; the backend does not report per-side scores
pub const SCORE_UNAVAILABLE: &str = "N/A";

/// Outcome of one completed round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    pub round: u32,
    pub label_a: String,
    pub label_b: String,
    pub outcome: Outcome,
    pub score: String,
}

impl RoundResult {
    pub fn new(round: u32, label_a: &str, label_b: &str, outcome: Outcome) -> Self {
        Self {
            round,
            label_a: label_a.to_string(),
            label_b: label_b.to_string(),
            outcome,
            score: SCORE_UNAVAILABLE.to_string(),
        }
    }
}

/// Immutable view handed to observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub wins_a: u32,
    pub wins_b: u32,
    pub draws: u32,
    /// Percentages rounded to one decimal
    pub win_rate_a: f64,
    pub win_rate_b: f64,
    /// Most recent round first
    pub history: Vec<RoundResult>,
}

#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    wins_a: u32,
    wins_b: u32,
    draws: u32,
    history: Vec<RoundResult>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record(&mut self, result: RoundResult) {
        match result.outcome {
            Outcome::A => self.wins_a += 1,
            Outcome::B => self.wins_b += 1,
            Outcome::Draw => self.draws += 1,
        }
        self.history.push(result);
    }

    pub fn rounds_played(&self) -> u32 {
        self.history.len() as u32
    }

    pub fn wins_a(&self) -> u32 {
        self.wins_a
    }

    pub fn wins_b(&self) -> u32 {
        self.wins_b
    }

    pub fn draws(&self) -> u32 {
        self.draws
    }

    /// History in the order rounds were played
    pub fn history(&self) -> &[RoundResult] {
        &self.history
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            wins_a: self.wins_a,
            wins_b: self.wins_b,
            draws: self.draws,
            win_rate_a: win_rate(self.wins_a, self.rounds_played()),
            win_rate_b: win_rate(self.wins_b, self.rounds_played()),
            history: self.history.iter().rev().cloned().collect(),
        }
    }

    /// Generate a text report
    pub fn report(&self) -> String {
        let stats = self.snapshot();
        let mut report = String::new();
        report.push_str("=== Tournament Results ===\n\n");
        report.push_str(&format!(
            "{:<6} {:<32} {:<32} {:>6} {:>6}\n",
            "Round", "Deck P0 (AI 1)", "Deck P1 (AI 2)", "Winner", "Score"
        ));
        report.push_str(&"-".repeat(86));
        report.push('\n');

        for result in &self.history {
            report.push_str(&format!(
                "{:<6} {:<32} {:<32} {:>6} {:>6}\n",
                result.round,
                result.label_a,
                result.label_b,
                result.outcome.to_string(),
                result.score
            ));
        }

        report.push('\n');
        report.push_str(&format!(
            "AI 1: {} wins ({:.1}%)  Draws: {}  AI 2: {} wins ({:.1}%)\n",
            stats.wins_a, stats.win_rate_a, stats.draws, stats.wins_b, stats.win_rate_b
        ));
        report
    }
}

fn win_rate(wins: u32, played: u32) -> f64 {
    if played == 0 {
        return 0.0;
    }
    (wins as f64 / played as f64 * 1000.0).round() / 10.0
}
