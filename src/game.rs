use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Deck and board constants
pub const DECK_SIZE: usize = 18;
pub const MIN_CARD: u8 = 1;
pub const MAX_CARD: u8 = 9;
pub const BOARD_SIZE: usize = 9;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArenaError {
    #[error("Failed to reach backend: {0}")]
    Transport(String),
    #[error("API Error: {0}")]
    Backend(String),
    #[error("Malformed backend response: {0}")]
    Protocol(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid deck: {0}")]
    InvalidDeck(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// One side of a match. Side A is backend player 0, side B is player 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn index(&self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }

    pub fn from_index(index: i64) -> Option<Side> {
        match index {
            0 => Some(Side::A),
            1 => Some(Side::B),
            _ => None,
        }
    }

    pub fn opponent(&self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Side::A => "AI 1",
            Side::B => "AI 2",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    A,
    B,
    Draw,
}

impl Outcome {
    /// Any winner id other than 0 or 1 (including none) counts as a draw.
    pub fn from_winner(winner: Option<i64>) -> Outcome {
        match winner.and_then(Side::from_index) {
            Some(Side::A) => Outcome::A,
            Some(Side::B) => Outcome::B,
            None => Outcome::Draw,
        }
    }

    pub fn winner(&self) -> Option<Side> {
        match self {
            Outcome::A => Some(Side::A),
            Outcome::B => Some(Side::B),
            Outcome::Draw => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.winner() {
            Some(side) => write!(f, "{}", side),
            None => f.write_str("Draw"),
        }
    }
}

/// An ordered set of cards handed to one side for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Deck(Vec<u8>);

impl TryFrom<Vec<u8>> for Deck {
    type Error = ArenaError;

    fn try_from(cards: Vec<u8>) -> Result<Self, Self::Error> {
        Deck::new(cards)
    }
}

impl From<Deck> for Vec<u8> {
    fn from(deck: Deck) -> Self {
        deck.0
    }
}

impl Deck {
    pub fn new(cards: Vec<u8>) -> Result<Self, ArenaError> {
        if cards.len() != DECK_SIZE {
            return Err(ArenaError::InvalidDeck(format!(
                "expected {} cards, got {}",
                DECK_SIZE,
                cards.len()
            )));
        }
        if let Some(card) = cards
            .iter()
            .find(|&&card| !(MIN_CARD..=MAX_CARD).contains(&card))
        {
            return Err(ArenaError::InvalidDeck(format!(
                "card value {} outside {}-{}",
                card, MIN_CARD, MAX_CARD
            )));
        }
        Ok(Deck(cards))
    }

    /// Sentinel deck for rounds outside the tournament. Never sent to the backend.
    pub fn empty() -> Self {
        Deck(Vec::new())
    }

    pub fn cards(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.0.len() == DECK_SIZE
    }
}

impl fmt::Display for Deck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cards: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", cards.join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub value: u8,
    pub player: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: u8,
    pub name: String,
    pub is_ai: bool,
    pub color_id: u8,
    pub hand: Vec<u8>,
    pub deck_count: u32,
    pub hand_count: u32,
    pub total_cards: u32,
}

impl PlayerState {
    pub fn cards_remaining(&self) -> u32 {
        self.hand_count + self.deck_count
    }

    /// Cards of the round's deck already placed on the board.
    pub fn cards_played(&self) -> u32 {
        (DECK_SIZE as u32).saturating_sub(self.cards_remaining())
    }
}

/// Authoritative match document returned by every backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    #[serde(rename = "game_id")]
    pub match_id: String,
    pub board: Vec<Vec<Option<Cell>>>,
    /// Backend player id; may be a sentinel such as -1 once the game is over
    #[serde(rename = "currentPlayerId")]
    pub current_player: i64,
    #[serde(rename = "winnerId", default)]
    pub winner: Option<i64>,
    pub players: Vec<PlayerState>,
    #[serde(rename = "gameOver")]
    pub game_over: bool,
}

impl MatchState {
    /// One-based number of the player to move, as shown in status texts
    pub fn seat_number(&self) -> i64 {
        self.current_player.saturating_add(1)
    }

    pub fn player(&self, side: Side) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id as usize == side.index())
    }

    /// Final outcome, only once the backend has declared the game over.
    pub fn outcome(&self) -> Option<Outcome> {
        if self.game_over {
            Some(Outcome::from_winner(self.winner))
        } else {
            None
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<Cell> {
        self.board.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    pub fn occupied_cells(&self) -> usize {
        self.board.iter().flatten().filter(|c| c.is_some()).count()
    }
}
