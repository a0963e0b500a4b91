use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

use crate::game::{ArenaError, Deck, MatchState};

/// External service that owns the game rules and both AI players
#[async_trait]
pub trait MatchBackend: Send + Sync {
    /// Create a match from both sides' full decks
    async fn start_match(&self, deck_a: &Deck, deck_b: &Deck) -> Result<MatchState, ArenaError>;

    /// Apply exactly one ply to an existing match
    async fn advance_match(&self, match_id: &str) -> Result<MatchState, ArenaError>;
}

#[derive(Serialize)]
struct StartRequest<'a> {
    #[serde(rename = "deckP0")]
    deck_p0: &'a Deck,
    #[serde(rename = "deckP1")]
    deck_p1: &'a Deck,
}

#[derive(Serialize)]
struct MoveRequest<'a> {
    #[serde(rename = "gameId")]
    game_id: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Value,
}

impl ErrorBody {
    /// The `error` field as text, None when it is absent or falsy
    fn message(self) -> Option<String> {
        match self.error {
            Value::Null | Value::Bool(false) => None,
            Value::String(message) if message.is_empty() => None,
            Value::Number(n) if n.as_f64() == Some(0.0) => None,
            Value::String(message) => Some(message),
            other => Some(other.to_string()),
        }
    }
}

/// JSON-over-HTTP client for the match service
#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    http: Client,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ArenaError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ArenaError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(HttpBackend {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<MatchState, ArenaError> {
        let url = format!("{}{}", self.base_url, endpoint);
        trace!(%url, "POST");

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ArenaError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response.json::<MatchState>().await.map_err(body_error)
    }
}

#[async_trait]
impl MatchBackend for HttpBackend {
    async fn start_match(&self, deck_a: &Deck, deck_b: &Deck) -> Result<MatchState, ArenaError> {
        let body = StartRequest {
            deck_p0: deck_a,
            deck_p1: deck_b,
        };
        let state = self.post("/start_ai_test", &body).await?;
        debug!(match_id = %state.match_id, "match created");
        Ok(state)
    }

    async fn advance_match(&self, match_id: &str) -> Result<MatchState, ArenaError> {
        self.post("/ai_move", &MoveRequest { game_id: match_id })
            .await
    }
}

/// Only an undecodable body is a protocol fault; a failed or timed out read
/// of the body is a transport fault
fn body_error(err: reqwest::Error) -> ArenaError {
    if err.is_decode() {
        ArenaError::Protocol(err.to_string())
    } else {
        ArenaError::Transport(err.to_string())
    }
}

/// Prefer the backend's own `error` message, fall back to the status text
async fn error_from_response(response: Response) -> ArenaError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::message)
        .unwrap_or_else(|| status_text(status));
    ArenaError::Backend(message)
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_str().to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::game::{Cell, PlayerState, BOARD_SIZE};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    /// In-process backend that plays a fixed number of plies per match and
    /// finishes each match with the next scripted winner id
    pub struct ScriptedBackend {
        plies_per_match: usize,
        winners: Mutex<VecDeque<Option<i64>>>,
        start_failure: Mutex<Option<ArenaError>>,
        advance_failure: Mutex<Option<ArenaError>>,
        matches: Mutex<Vec<(String, usize, Option<i64>)>>,
        pub started_decks: Mutex<Vec<(Deck, Deck)>>,
        pub start_calls: AtomicUsize,
        pub advance_calls: AtomicUsize,
        gate: Mutex<Option<Arc<Notify>>>,
        panic_on_advance: bool,
        pub advance_entered: Arc<Notify>,
    }

    impl ScriptedBackend {
        pub fn new(plies_per_match: usize, winners: Vec<Option<i64>>) -> Self {
            ScriptedBackend {
                plies_per_match,
                winners: Mutex::new(winners.into()),
                start_failure: Mutex::new(None),
                advance_failure: Mutex::new(None),
                matches: Mutex::new(Vec::new()),
                started_decks: Mutex::new(Vec::new()),
                start_calls: AtomicUsize::new(0),
                advance_calls: AtomicUsize::new(0),
                gate: Mutex::new(None),
                panic_on_advance: false,
                advance_entered: Arc::new(Notify::new()),
            }
        }

        pub fn fail_start_with(self, err: ArenaError) -> Self {
            *self.start_failure.lock().unwrap() = Some(err);
            self
        }

        pub fn fail_advance_with(self, err: ArenaError) -> Self {
            *self.advance_failure.lock().unwrap() = Some(err);
            self
        }

        /// Panic inside every advance call, as a buggy backend client would
        pub fn panicking(mut self) -> Self {
            self.panic_on_advance = true;
            self
        }

        /// Hold every advance call until the returned handle is notified
        pub fn gated(self) -> (Self, Arc<Notify>) {
            let gate = Arc::new(Notify::new());
            *self.gate.lock().unwrap() = Some(gate.clone());
            (self, gate)
        }

        fn document(match_id: &str, plies: usize, total: usize, winner: Option<i64>) -> MatchState {
            let mut board = vec![vec![None; BOARD_SIZE]; BOARD_SIZE];
            for ply in 0..plies {
                board[ply / BOARD_SIZE][ply % BOARD_SIZE] = Some(Cell {
                    value: (ply % 9) as u8 + 1,
                    player: (ply % 2) as u8,
                });
            }
            // Player 0 places on even plies, player 1 on odd ones
            let player = |id: u8| {
                let placed = (plies + 1 - id as usize) / 2;
                PlayerState {
                    id,
                    name: format!("AI {}", id + 1),
                    is_ai: true,
                    color_id: id,
                    hand: vec![1, 2],
                    deck_count: 16u32.saturating_sub(placed as u32),
                    hand_count: 2,
                    total_cards: 18,
                }
            };
            let game_over = plies >= total;
            MatchState {
                match_id: match_id.to_string(),
                board,
                current_player: (plies % 2) as i64,
                winner: if game_over { winner } else { None },
                players: vec![player(0), player(1)],
                game_over,
            }
        }
    }

    #[async_trait]
    impl MatchBackend for ScriptedBackend {
        async fn start_match(&self, deck_a: &Deck, deck_b: &Deck) -> Result<MatchState, ArenaError> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.start_failure.lock().unwrap().clone() {
                return Err(err);
            }
            self.started_decks
                .lock()
                .unwrap()
                .push((deck_a.clone(), deck_b.clone()));

            let winner = self.winners.lock().unwrap().pop_front().unwrap_or(None);
            let mut matches = self.matches.lock().unwrap();
            let match_id = format!("match-{}", matches.len() + 1);
            matches.push((match_id.clone(), 0, winner));
            Ok(Self::document(&match_id, 0, self.plies_per_match, winner))
        }

        async fn advance_match(&self, match_id: &str) -> Result<MatchState, ArenaError> {
            self.advance_calls.fetch_add(1, Ordering::SeqCst);
            self.advance_entered.notify_one();
            let gate = self.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if self.panic_on_advance {
                panic!("scripted backend failure in {}", match_id);
            }
            if let Some(err) = self.advance_failure.lock().unwrap().clone() {
                return Err(err);
            }

            let mut matches = self.matches.lock().unwrap();
            let entry = matches
                .iter_mut()
                .find(|(id, _, _)| id == match_id)
                .ok_or_else(|| ArenaError::Backend("unknown game".to_string()))?;
            entry.1 += 1;
            Ok(Self::document(match_id, entry.1, self.plies_per_match, entry.2))
        }
    }
}
