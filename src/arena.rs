use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::backend::MatchBackend;
use crate::deck::{CatalogueEntry, DEFAULT_ROUNDS, DeckAllocator, DeckPolicy, RoundDecks};
use crate::game::{ArenaError, DECK_SIZE, Deck, MatchState, PlayerState, Side};
use crate::results::{ResultAggregator, RoundResult, StatsSnapshot};

pub const DEFAULT_API_URL: &str = "http://localhost:5000";

#[derive(Debug, Clone)]
pub struct ArenaConfig {
    pub api_url: String,
    pub rounds: u32,
    pub policy: DeckPolicy,
    /// Start with pool B feeding side A
    pub swapped: bool,
    /// Seed for generated decks; drawn from the OS when absent
    pub seed: Option<u64>,
    /// Delay between successive plies
    pub poll_interval: Duration,
    /// Delay between a finished round and the next round's start
    pub round_pause: Duration,
    /// None waits on the backend indefinitely
    pub request_timeout: Option<Duration>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        ArenaConfig {
            api_url: DEFAULT_API_URL.to_string(),
            rounds: DEFAULT_ROUNDS,
            policy: DeckPolicy::FixedPairing,
            swapped: false,
            seed: None,
            poll_interval: Duration::from_millis(50),
            round_pause: Duration::from_secs(1),
            request_timeout: None,
        }
    }
}

/// Shared stop flag, checked before every polling tick and after every response
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Holds the single-flight slot for one outstanding advance request
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub enum DriveEvent<'a> {
    /// About to ask the backend for `player`'s ply
    Requesting { player: i64 },
    Applied(&'a MatchState),
}

#[derive(Debug)]
pub enum MatchEnd {
    Finished(MatchState),
    Cancelled,
}

/// Owns the one in-flight match of a tournament run
pub struct MatchDriver {
    backend: Arc<dyn MatchBackend>,
    cancel: CancelToken,
    current: Mutex<Option<MatchState>>,
    in_flight: AtomicBool,
}

impl MatchDriver {
    pub fn new(backend: Arc<dyn MatchBackend>, cancel: CancelToken) -> Self {
        MatchDriver {
            backend,
            cancel,
            current: Mutex::new(None),
            in_flight: AtomicBool::new(false),
        }
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<MatchState>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Option<MatchState> {
        self.lock_current().clone()
    }

    pub fn is_request_outstanding(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn start(&self, deck_a: &Deck, deck_b: &Deck) -> Result<MatchState, ArenaError> {
        if self.is_stopped() {
            return Err(ArenaError::InvalidState("match driver has been stopped".to_string()));
        }
        for deck in [deck_a, deck_b] {
            if !deck.is_complete() {
                return Err(ArenaError::InvalidDeck(format!(
                    "expected {} cards, got {}",
                    DECK_SIZE,
                    deck.len()
                )));
            }
        }

        *self.lock_current() = None;
        let state = self.backend.start_match(deck_a, deck_b).await?;
        if self.is_stopped() {
            return Err(ArenaError::InvalidState("match driver stopped while starting".to_string()));
        }
        *self.lock_current() = Some(state.clone());
        Ok(state)
    }

    /// Request one ply. Returns `Ok(None)` without contacting the backend when
    /// no match is active, the match is over, or another request is outstanding.
    /// A response arriving after `stop` is dropped.
    pub async fn advance(&self) -> Result<Option<MatchState>, ArenaError> {
        if self.is_stopped() {
            return Ok(None);
        }
        let match_id = match self.lock_current().as_ref() {
            Some(state) if !state.game_over => state.match_id.clone(),
            _ => return Ok(None),
        };
        let Some(_slot) = InFlight::acquire(&self.in_flight) else {
            trace!(%match_id, "advance already outstanding, dropping duplicate");
            return Ok(None);
        };

        let state = self.backend.advance_match(&match_id).await?;
        if self.is_stopped() {
            debug!(%match_id, "discarding ply for abandoned match");
            return Ok(None);
        }
        *self.lock_current() = Some(state.clone());
        Ok(Some(state))
    }

    /// Poll the backend until the match ends, the driver is stopped, or a
    /// request fails. `Finished` is returned at most once per match.
    pub async fn drive<F>(&self, poll_interval: Duration, mut on_event: F) -> Result<MatchEnd, ArenaError>
    where
        F: FnMut(DriveEvent<'_>) + Send,
    {
        loop {
            if self.is_stopped() {
                return Ok(MatchEnd::Cancelled);
            }
            let player = match self.current() {
                Some(state) if state.game_over => return Ok(MatchEnd::Finished(state)),
                Some(state) => state.current_player,
                None => {
                    return Err(ArenaError::InvalidState("no active match to drive".to_string()));
                }
            };

            tokio::time::sleep(poll_interval).await;
            if self.is_stopped() {
                return Ok(MatchEnd::Cancelled);
            }

            on_event(DriveEvent::Requesting { player });
            if let Some(state) = self.advance().await? {
                debug!(match_id = %state.match_id, next = state.current_player, "ply applied");
                on_event(DriveEvent::Applied(&state));
                if state.game_over {
                    return Ok(MatchEnd::Finished(state));
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    RoundStarting,
    RoundInProgress,
    RoundComplete,
    TournamentComplete,
}

impl Phase {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Phase::RoundStarting | Phase::RoundInProgress | Phase::RoundComplete
        )
    }
}

/// Read-only view for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArenaSnapshot {
    pub phase: Phase,
    pub round: u32,
    pub total_rounds: u32,
    pub status: String,
    pub policy: String,
    pub swapped: bool,
    pub pool_a: String,
    pub pool_b: String,
    pub decks: RoundDecks,
    pub live: Option<MatchState>,
    /// Cards of this round's deck already placed, indexed by side
    pub cards_played: [u32; 2],
    pub cards_remaining: [u32; 2],
    pub stats: StatsSnapshot,
}

/// Tournament state record. Transitions never perform I/O; each one checks
/// the phase it is valid in and the run it belongs to.
pub struct RoundScheduler {
    phase: Phase,
    round: u32,
    run_id: u64,
    status: String,
    decks: DeckAllocator,
    results: ResultAggregator,
    current: Option<RoundDecks>,
    live: Option<MatchState>,
    rng: ChaCha8Rng,
}

impl RoundScheduler {
    pub fn new(decks: DeckAllocator, rng: ChaCha8Rng) -> Self {
        let status = format!("Ready to start tournament ({} rounds).", decks.rounds());
        RoundScheduler {
            phase: Phase::Idle,
            round: 0,
            run_id: 0,
            status,
            decks,
            results: ResultAggregator::new(),
            current: None,
            live: None,
            rng,
        }
    }

    pub fn from_config(config: &ArenaConfig) -> Result<Self, ArenaError> {
        let mut rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };
        let mut decks = DeckAllocator::new(config.policy.clone(), config.rounds, &mut rng)?;
        decks.set_swapped(config.swapped);
        Ok(Self::new(decks, rng))
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn total_rounds(&self) -> u32 {
        self.decks.rounds()
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn results(&self) -> &ResultAggregator {
        &self.results
    }

    pub fn decks(&self) -> &DeckAllocator {
        &self.decks
    }

    fn expect(&self, run_id: u64, allowed: &[Phase], action: &str) -> Result<(), ArenaError> {
        if run_id != self.run_id {
            return Err(ArenaError::InvalidState(format!(
                "cannot {}: run {} has been superseded by run {}",
                action, run_id, self.run_id
            )));
        }
        if !allowed.contains(&self.phase) {
            return Err(ArenaError::InvalidState(format!(
                "cannot {} while {:?}",
                action, self.phase
            )));
        }
        Ok(())
    }

    fn enter_round(&mut self, round: u32) -> RoundDecks {
        let decks = self.decks.decks_for(round);
        self.round = round;
        self.phase = Phase::RoundStarting;
        self.live = None;
        self.status = format!(
            "Starting round {} / {} (P0: {}, P1: {})...",
            round,
            self.total_rounds(),
            decks.label_a,
            decks.label_b
        );
        self.current = Some(decks.clone());
        decks
    }

    /// Idle or TournamentComplete -> RoundStarting(1). Returns the new run id
    /// and the decks for round 1.
    pub fn start_tournament(&mut self) -> Result<(u64, RoundDecks), ArenaError> {
        if !matches!(self.phase, Phase::Idle | Phase::TournamentComplete) {
            return Err(ArenaError::InvalidState(format!(
                "cannot start a tournament while {:?}",
                self.phase
            )));
        }
        self.run_id += 1;
        self.results.reset();
        self.decks.regenerate(&mut self.rng);
        let decks = self.enter_round(1);
        Ok((self.run_id, decks))
    }

    /// RoundStarting -> RoundInProgress
    pub fn round_started(&mut self, run_id: u64, state: MatchState) -> Result<(), ArenaError> {
        self.expect(run_id, &[Phase::RoundStarting], "start a round")?;
        self.phase = Phase::RoundInProgress;
        self.status = format!(
            "Round {} / {} started. P{} to move.",
            self.round,
            self.total_rounds(),
            state.seat_number()
        );
        self.live = Some(state);
        Ok(())
    }

    pub fn ply_requested(&mut self, run_id: u64, player: i64) -> Result<(), ArenaError> {
        self.expect(run_id, &[Phase::RoundInProgress], "request a ply")?;
        self.status = format!("AI P{} is thinking...", player.saturating_add(1));
        Ok(())
    }

    pub fn ply_applied(&mut self, run_id: u64, state: MatchState) -> Result<(), ArenaError> {
        self.expect(run_id, &[Phase::RoundInProgress], "apply a ply")?;
        if !state.game_over {
            self.status = format!("P{} to move.", state.seat_number());
        }
        self.live = Some(state);
        Ok(())
    }

    /// RoundInProgress -> RoundComplete, or TournamentComplete after the last
    /// round. Records the round's result.
    pub fn round_finished(&mut self, run_id: u64, state: MatchState) -> Result<RoundResult, ArenaError> {
        self.expect(run_id, &[Phase::RoundInProgress], "finish a round")?;
        let outcome = state
            .outcome()
            .ok_or_else(|| ArenaError::InvalidState("match is not over".to_string()))?;

        let decks = self
            .current
            .clone()
            .unwrap_or_else(|| self.decks.decks_for(self.round));
        let result = RoundResult::new(self.round, &decks.label_a, &decks.label_b, outcome);
        self.results.record(result.clone());
        self.live = Some(state);

        if self.round >= self.total_rounds() {
            self.phase = Phase::TournamentComplete;
            self.status = "Tournament complete!".to_string();
        } else {
            self.phase = Phase::RoundComplete;
            self.status = format!("GAME OVER round {}! Winner: {}.", self.round, outcome);
        }
        Ok(result)
    }

    /// RoundComplete -> RoundStarting(next)
    pub fn begin_next_round(&mut self, run_id: u64) -> Result<RoundDecks, ArenaError> {
        self.expect(run_id, &[Phase::RoundComplete], "begin the next round")?;
        Ok(self.enter_round(self.round + 1))
    }

    /// Fatal backend error: halt the run and surface the message verbatim
    pub fn fail(&mut self, run_id: u64, context: &str, err: &ArenaError) -> Result<(), ArenaError> {
        self.expect(
            run_id,
            &[Phase::RoundStarting, Phase::RoundInProgress, Phase::RoundComplete],
            "fail a round",
        )?;
        self.phase = Phase::Idle;
        self.status = format!("{}: {}", context, err);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), ArenaError> {
        if !self.phase.is_running() {
            return Err(ArenaError::InvalidState(format!(
                "no tournament to stop while {:?}",
                self.phase
            )));
        }
        self.phase = Phase::Idle;
        self.status = format!("Tournament stopped during round {}.", self.round);
        Ok(())
    }

    /// Only valid while no run is active. Clears all tournament state.
    pub fn toggle_deck_arrangement(&mut self) -> Result<bool, ArenaError> {
        if self.phase.is_running() {
            return Err(ArenaError::InvalidState(format!(
                "cannot swap decks while {:?}",
                self.phase
            )));
        }
        let swapped = self.decks.toggle_swap();
        self.phase = Phase::Idle;
        self.round = 0;
        self.results.reset();
        self.current = None;
        self.live = None;

        let (pool_a, pool_b) = self.decks.pool_summary();
        self.status = format!(
            "Decks swapped. Ready. P0 (AI 1) uses {} and P1 (AI 2) uses {}.",
            pool_a, pool_b
        );
        Ok(swapped)
    }

    /// Per-side count from the live match, 0 when no match is live
    fn per_side(&self, count: fn(&PlayerState) -> u32) -> [u32; 2] {
        [Side::A, Side::B].map(|side| {
            self.live
                .as_ref()
                .and_then(|state| state.player(side))
                .map(count)
                .unwrap_or(0)
        })
    }

    pub fn snapshot(&self) -> ArenaSnapshot {
        let (pool_a, pool_b) = self.decks.pool_summary();
        ArenaSnapshot {
            phase: self.phase,
            round: self.round,
            total_rounds: self.total_rounds(),
            status: self.status.clone(),
            policy: self.decks.policy().name().to_string(),
            swapped: self.decks.is_swapped(),
            pool_a,
            pool_b,
            decks: self
                .current
                .clone()
                .unwrap_or_else(|| self.decks.decks_for(self.round.max(1))),
            live: self.live.clone(),
            cards_played: self.per_side(PlayerState::cards_played),
            cards_remaining: self.per_side(PlayerState::cards_remaining),
            stats: self.results.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    poll_interval: Duration,
    round_pause: Duration,
}

struct ActiveRun {
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

/// Cloneable handle on the tournament engine. Commands are issued here; the
/// rounds themselves run on one background task per tournament run.
#[derive(Clone)]
pub struct Arena {
    backend: Arc<dyn MatchBackend>,
    scheduler: Arc<Mutex<RoundScheduler>>,
    active: Arc<Mutex<Option<ActiveRun>>>,
    timing: Timing,
}

fn lock(scheduler: &Mutex<RoundScheduler>) -> MutexGuard<'_, RoundScheduler> {
    scheduler.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Arena {
    pub fn new(config: &ArenaConfig, backend: Arc<dyn MatchBackend>) -> Result<Self, ArenaError> {
        let scheduler = RoundScheduler::from_config(config)?;
        Ok(Arena {
            backend,
            scheduler: Arc::new(Mutex::new(scheduler)),
            active: Arc::new(Mutex::new(None)),
            timing: Timing {
                poll_interval: config.poll_interval,
                round_pause: config.round_pause,
            },
        })
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> ArenaSnapshot {
        lock(&self.scheduler).snapshot()
    }

    pub fn catalogue(&self) -> Vec<CatalogueEntry> {
        lock(&self.scheduler).decks().catalogue()
    }

    /// Text table of the rounds played so far
    pub fn report(&self) -> String {
        lock(&self.scheduler).results().report()
    }

    pub fn start_tournament(&self) -> Result<ArenaSnapshot, ArenaError> {
        let (run_id, decks) = lock(&self.scheduler).start_tournament()?;
        info!(run_id, "tournament started");

        let cancel = CancelToken::new();
        let driver = MatchDriver::new(self.backend.clone(), cancel.clone());
        let rounds = tokio::spawn(run_tournament(
            self.scheduler.clone(),
            driver,
            decks,
            run_id,
            self.timing,
        ));

        // A run task that dies must not leave its run looking active
        let supervised = self.scheduler.clone();
        let stop_run = cancel.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = rounds.await {
                error!(run_id, %err, "tournament task failed");
                stop_run.cancel();
                let err = ArenaError::InvalidState(err.to_string());
                let _ = lock(&supervised).fail(run_id, "Tournament halted", &err);
            }
        });

        let previous = self.active().replace(ActiveRun {
            cancel,
            handle: Some(handle),
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
        Ok(self.snapshot())
    }

    pub fn stop_tournament(&self) -> Result<ArenaSnapshot, ArenaError> {
        lock(&self.scheduler).stop()?;
        if let Some(run) = self.active().as_ref() {
            run.cancel.cancel();
        }
        warn!("tournament stopped by operator");
        Ok(self.snapshot())
    }

    pub fn toggle_deck_arrangement(&self) -> Result<ArenaSnapshot, ArenaError> {
        let swapped = lock(&self.scheduler).toggle_deck_arrangement()?;
        info!(swapped, "deck arrangement toggled");
        Ok(self.snapshot())
    }

    /// Wait for the current run's task to finish
    pub async fn wait(&self) {
        let handle = self.active().as_mut().and_then(|run| run.handle.take());
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(%err, "tournament task failed");
            }
        }
    }
}

async fn run_tournament(
    scheduler: Arc<Mutex<RoundScheduler>>,
    driver: MatchDriver,
    mut decks: RoundDecks,
    run_id: u64,
    timing: Timing,
) {
    loop {
        let round = decks.round;
        info!(round, deck_a = %decks.label_a, deck_b = %decks.label_b, "starting round");

        let state = match driver.start(&decks.deck_a, &decks.deck_b).await {
            Ok(state) => state,
            Err(err) => {
                if !driver.is_stopped() {
                    error!(round, %err, "failed to start round");
                    let context = format!("Failed to start round {}", round);
                    let _ = lock(&scheduler).fail(run_id, &context, &err);
                    driver.stop();
                }
                return;
            }
        };
        if lock(&scheduler).round_started(run_id, state).is_err() {
            driver.stop();
            return;
        }

        let end = driver
            .drive(timing.poll_interval, |event| {
                let mut scheduler = lock(&scheduler);
                let _ = match event {
                    DriveEvent::Requesting { player } => scheduler.ply_requested(run_id, player),
                    DriveEvent::Applied(state) => scheduler.ply_applied(run_id, state.clone()),
                };
            })
            .await;

        let final_state = match end {
            Ok(MatchEnd::Finished(state)) => state,
            Ok(MatchEnd::Cancelled) => {
                debug!(round, "round abandoned");
                return;
            }
            Err(err) => {
                error!(round, %err, "failed to advance match");
                let _ = lock(&scheduler).fail(run_id, "Failed to advance AI move", &err);
                driver.stop();
                return;
            }
        };

        let more_rounds = {
            let mut scheduler = lock(&scheduler);
            match scheduler.round_finished(run_id, final_state) {
                Ok(result) => {
                    info!(round, winner = %result.outcome, "round complete");
                    scheduler.phase() == Phase::RoundComplete
                }
                Err(err) => {
                    debug!(round, %err, "result for abandoned round dropped");
                    return;
                }
            }
        };
        if !more_rounds {
            info!(run_id, "tournament complete");
            return;
        }

        tokio::time::sleep(timing.round_pause).await;
        if driver.is_stopped() {
            return;
        }
        decks = match lock(&scheduler).begin_next_round(run_id) {
            Ok(decks) => decks,
            Err(_) => return,
        };
    }
}
