//! Deck assignment policies for tournament rounds

use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::ops::RangeInclusive;

use crate::game::{ArenaError, DECK_SIZE, Deck, MAX_CARD, MIN_CARD, Side};

pub const DEFAULT_ROUNDS: u32 = 10;
pub const NOT_AVAILABLE: &str = "N/A";

/// Number of fixed sets in each pool
pub const POOL_SIZE: usize = 10;

/// The twenty fixed tournament sets. Sets 1-10 form pool A, sets 11-20 pool B.
pub const FIXED_DECKS: [[u8; DECK_SIZE]; 2 * POOL_SIZE] = [
    [6, 1, 3, 8, 4, 2, 7, 6, 9, 2, 3, 4, 9, 5, 1, 5, 8, 7],
    [5, 1, 3, 7, 6, 8, 2, 3, 4, 8, 5, 9, 7, 9, 6, 1, 2, 4],
    [6, 2, 5, 6, 5, 4, 1, 3, 3, 2, 8, 7, 8, 9, 1, 4, 9, 7],
    [3, 7, 6, 4, 5, 7, 2, 6, 5, 4, 8, 1, 1, 9, 2, 9, 3, 8],
    [9, 6, 1, 3, 6, 4, 4, 8, 9, 5, 2, 3, 7, 1, 8, 7, 5, 2],
    [9, 2, 6, 1, 6, 3, 8, 7, 4, 2, 8, 9, 5, 3, 7, 5, 4, 1],
    [3, 7, 4, 5, 7, 6, 9, 3, 9, 5, 6, 2, 8, 2, 4, 1, 8, 1],
    [3, 7, 1, 5, 6, 1, 4, 2, 5, 9, 4, 8, 3, 8, 9, 2, 7, 6],
    [5, 6, 3, 8, 8, 9, 1, 5, 7, 4, 1, 7, 3, 9, 2, 6, 4, 2],
    [9, 5, 3, 2, 8, 6, 4, 3, 4, 2, 7, 1, 8, 1, 7, 9, 6, 5],
    [3, 1, 3, 2, 9, 6, 2, 8, 1, 7, 4, 8, 7, 4, 6, 5, 9, 5],
    [1, 6, 3, 4, 6, 4, 7, 7, 9, 3, 5, 5, 8, 2, 2, 1, 9, 8],
    [9, 8, 9, 3, 4, 6, 6, 7, 3, 1, 1, 2, 5, 2, 4, 8, 5, 7],
    [2, 6, 5, 9, 1, 6, 3, 7, 7, 2, 9, 1, 8, 8, 4, 3, 5, 4],
    [3, 4, 8, 9, 4, 7, 7, 6, 2, 5, 1, 1, 3, 6, 2, 5, 8, 9],
    [5, 1, 4, 9, 2, 9, 8, 6, 5, 8, 7, 3, 6, 1, 4, 7, 3, 2],
    [2, 8, 2, 3, 4, 7, 1, 8, 3, 6, 6, 5, 1, 4, 5, 9, 7, 9],
    [5, 9, 6, 7, 1, 3, 4, 4, 9, 5, 2, 8, 2, 3, 8, 1, 7, 6],
    [9, 1, 9, 4, 5, 5, 2, 2, 3, 8, 8, 7, 4, 3, 7, 1, 6, 6],
    [2, 4, 7, 1, 6, 2, 5, 3, 8, 3, 5, 7, 4, 8, 9, 1, 9, 6],
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeckPolicy {
    /// Round i plays pool-A set i against pool-B set i
    FixedPairing,
    /// Both sides get an independent shuffle of two copies of 1-9
    GeneratedFair,
    /// `weak_side` draws low-weighted cards during `weak_rounds`, fair otherwise
    GeneratedSkewed {
        weak_side: Side,
        weak_rounds: RangeInclusive<u32>,
    },
}

impl DeckPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            DeckPolicy::FixedPairing => "fixed-pairing",
            DeckPolicy::GeneratedFair => "generated-fair",
            DeckPolicy::GeneratedSkewed { .. } => "generated-skewed",
        }
    }
}

/// Decks and labels assigned to one round, already arranged by side
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundDecks {
    pub round: u32,
    pub deck_a: Deck,
    pub deck_b: Deck,
    pub label_a: String,
    pub label_b: String,
}

impl RoundDecks {
    fn unavailable(round: u32) -> Self {
        RoundDecks {
            round,
            deck_a: Deck::empty(),
            deck_b: Deck::empty(),
            label_a: NOT_AVAILABLE.to_string(),
            label_b: NOT_AVAILABLE.to_string(),
        }
    }
}

/// One deck in the catalogue with the side currently playing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogueEntry {
    pub label: String,
    pub owner: Side,
    pub cards: Deck,
}

#[derive(Debug, Clone)]
pub struct DeckAllocator {
    policy: DeckPolicy,
    rounds: u32,
    swapped: bool,
    /// Per-round (pool A, pool B) decks for the generated policies
    generated: Vec<(Deck, Deck)>,
}

impl DeckAllocator {
    pub fn new<R: Rng + ?Sized>(
        policy: DeckPolicy,
        rounds: u32,
        rng: &mut R,
    ) -> Result<Self, ArenaError> {
        if rounds == 0 {
            return Err(ArenaError::InvalidConfig(
                "a tournament needs at least one round".to_string(),
            ));
        }
        if policy == DeckPolicy::FixedPairing && rounds as usize > POOL_SIZE {
            return Err(ArenaError::InvalidConfig(format!(
                "fixed pairing has only {} sets per side, {} rounds requested",
                POOL_SIZE, rounds
            )));
        }
        if let DeckPolicy::GeneratedSkewed { weak_rounds, .. } = &policy {
            if weak_rounds.is_empty() || *weak_rounds.start() == 0 || *weak_rounds.end() > rounds {
                return Err(ArenaError::InvalidConfig(format!(
                    "skewed rounds {}-{} must lie within 1-{}",
                    weak_rounds.start(),
                    weak_rounds.end(),
                    rounds
                )));
            }
        }

        let mut allocator = DeckAllocator {
            policy,
            rounds,
            swapped: false,
            generated: Vec::new(),
        };
        allocator.regenerate(rng);
        Ok(allocator)
    }

    pub fn policy(&self) -> &DeckPolicy {
        &self.policy
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn is_swapped(&self) -> bool {
        self.swapped
    }

    pub fn set_swapped(&mut self, swapped: bool) {
        self.swapped = swapped;
    }

    pub fn toggle_swap(&mut self) -> bool {
        self.swapped = !self.swapped;
        self.swapped
    }

    /// Draw fresh decks for the generated policies. Called once per tournament
    /// start so every round of a run keeps the same decks.
    pub fn regenerate<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.generated = match &self.policy {
            DeckPolicy::FixedPairing => Vec::new(),
            DeckPolicy::GeneratedFair => (1..=self.rounds)
                .map(|_| (fair_deck(rng), fair_deck(rng)))
                .collect(),
            DeckPolicy::GeneratedSkewed {
                weak_side,
                weak_rounds,
            } => (1..=self.rounds)
                .map(|round| {
                    let skewed = weak_rounds.contains(&round);
                    let mut draw = |side: Side| {
                        if skewed && side == *weak_side {
                            low_skewed_deck(rng)
                        } else {
                            fair_deck(rng)
                        }
                    };
                    let a = draw(Side::A);
                    let b = draw(Side::B);
                    (a, b)
                })
                .collect(),
        };
    }

    pub fn decks_for(&self, round: u32) -> RoundDecks {
        if round == 0 || round > self.rounds {
            return RoundDecks::unavailable(round);
        }
        let index = (round - 1) as usize;

        let (deck_a, deck_b, label_a, label_b) = match &self.policy {
            DeckPolicy::FixedPairing => (
                fixed_deck(index),
                fixed_deck(index + POOL_SIZE),
                set_label(index),
                set_label(index + POOL_SIZE),
            ),
            DeckPolicy::GeneratedFair => {
                let (a, b) = &self.generated[index];
                let label = format!("Generated fair (round {})", round);
                (a.clone(), b.clone(), label.clone(), label)
            }
            DeckPolicy::GeneratedSkewed {
                weak_side,
                weak_rounds,
            } => {
                let (a, b) = &self.generated[index];
                let fair = format!("Generated fair (round {})", round);
                let weak = format!("Generated low-skew (round {})", round);
                let label = |side: Side| {
                    if weak_rounds.contains(&round) && side == *weak_side {
                        weak.clone()
                    } else {
                        fair.clone()
                    }
                };
                (a.clone(), b.clone(), label(Side::A), label(Side::B))
            }
        };

        if self.swapped {
            RoundDecks {
                round,
                deck_a: deck_b,
                deck_b: deck_a,
                label_a: label_b,
                label_b: label_a,
            }
        } else {
            RoundDecks {
                round,
                deck_a,
                deck_b,
                label_a,
                label_b,
            }
        }
    }

    /// Human readable description of which pool feeds each side
    pub fn pool_summary(&self) -> (String, String) {
        let (a, b) = match self.policy {
            DeckPolicy::FixedPairing => (
                format!("Set 1-{}", POOL_SIZE),
                format!("Set {}-{}", POOL_SIZE + 1, 2 * POOL_SIZE),
            ),
            _ => (
                format!("{} pool A", self.policy.name()),
                format!("{} pool B", self.policy.name()),
            ),
        };
        if self.swapped { (b, a) } else { (a, b) }
    }

    /// Every deck in play this tournament, labelled with its current owner
    pub fn catalogue(&self) -> Vec<CatalogueEntry> {
        let (range_a, range_b) = self.pool_summary();
        let owner_of_pool_a = if self.swapped { Side::B } else { Side::A };

        match self.policy {
            DeckPolicy::FixedPairing => (0..2 * POOL_SIZE)
                .map(|index| {
                    let owner = if index < POOL_SIZE {
                        owner_of_pool_a
                    } else {
                        owner_of_pool_a.opponent()
                    };
                    let range = if owner == Side::A { &range_a } else { &range_b };
                    CatalogueEntry {
                        label: format!("{} ({}: {})", set_label(index), owner, range),
                        owner,
                        cards: fixed_deck(index),
                    }
                })
                .collect(),
            _ => (1..=self.rounds)
                .flat_map(|round| {
                    let decks = self.decks_for(round);
                    [
                        CatalogueEntry {
                            label: format!("{} ({})", decks.label_a, Side::A),
                            owner: Side::A,
                            cards: decks.deck_a,
                        },
                        CatalogueEntry {
                            label: format!("{} ({})", decks.label_b, Side::B),
                            owner: Side::B,
                            cards: decks.deck_b,
                        },
                    ]
                })
                .collect(),
        }
    }
}

fn set_label(index: usize) -> String {
    format!("Set {}", index + 1)
}

fn fixed_deck(index: usize) -> Deck {
    Deck::new(FIXED_DECKS[index].to_vec()).unwrap_or_else(|_| Deck::empty())
}

/// Two copies of every face value, uniformly shuffled (Fisher-Yates)
pub fn fair_deck<R: Rng + ?Sized>(rng: &mut R) -> Deck {
    let mut cards: Vec<u8> = (MIN_CARD..=MAX_CARD).chain(MIN_CARD..=MAX_CARD).collect();
    cards.shuffle(rng);
    Deck::new(cards).unwrap_or_else(|_| Deck::empty())
}

/// Independent draws where face value v has weight 10 - v
pub fn low_skewed_deck<R: Rng + ?Sized>(rng: &mut R) -> Deck {
    let values: Vec<u8> = (MIN_CARD..=MAX_CARD).collect();
    let weights = values.iter().map(|&v| u32::from(MAX_CARD + 1 - v));
    let cards = match WeightedIndex::new(weights) {
        Ok(dist) => (0..DECK_SIZE).map(|_| values[dist.sample(rng)]).collect(),
        Err(_) => vec![MIN_CARD; DECK_SIZE],
    };
    Deck::new(cards).unwrap_or_else(|_| Deck::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    /// True when the deck holds exactly two copies of each face value
    fn is_two_copy_permutation(deck: &Deck) -> bool {
        let mut sorted = deck.cards().to_vec();
        sorted.sort_unstable();
        let expected: Vec<u8> = (1..=9).flat_map(|v| [v, v]).collect();
        sorted == expected
    }

    #[test]
    fn test_fixed_sets_are_complete() {
        for (index, cards) in FIXED_DECKS.iter().enumerate() {
            let deck = Deck::new(cards.to_vec()).unwrap();
            assert!(is_two_copy_permutation(&deck), "Set {} is malformed", index + 1);
        }
    }

    #[test]
    fn test_fixed_pairing_round_three() {
        let allocator = DeckAllocator::new(DeckPolicy::FixedPairing, 10, &mut rng()).unwrap();
        let decks = allocator.decks_for(3);

        assert_eq!(decks.round, 3);
        assert_eq!(decks.deck_a.cards(), &FIXED_DECKS[2]);
        assert_eq!(decks.deck_b.cards(), &FIXED_DECKS[12]);
        assert_eq!(decks.label_a, "Set 3");
        assert_eq!(decks.label_b, "Set 13");
    }

    #[test]
    fn test_swap_mirrors_every_round() {
        let mut allocator =
            DeckAllocator::new(DeckPolicy::FixedPairing, 10, &mut rng()).unwrap();
        let default: Vec<RoundDecks> = (1..=10).map(|r| allocator.decks_for(r)).collect();

        assert!(allocator.toggle_swap());
        for (round, before) in (1..=10).zip(default) {
            let after = allocator.decks_for(round);
            assert_eq!(after.deck_a, before.deck_b);
            assert_eq!(after.deck_b, before.deck_a);
            assert_eq!(after.label_a, before.label_b);
            assert_eq!(after.label_b, before.label_a);
        }
    }

    #[test]
    fn test_out_of_range_round_is_unavailable() {
        let allocator = DeckAllocator::new(DeckPolicy::FixedPairing, 10, &mut rng()).unwrap();

        for round in [0, 11, 99] {
            let decks = allocator.decks_for(round);
            assert!(decks.deck_a.is_empty());
            assert!(decks.deck_b.is_empty());
            assert_eq!(decks.label_a, NOT_AVAILABLE);
            assert_eq!(decks.label_b, NOT_AVAILABLE);
        }
    }

    #[test]
    fn test_fixed_pairing_rejects_too_many_rounds() {
        let result = DeckAllocator::new(DeckPolicy::FixedPairing, 11, &mut rng());
        assert!(matches!(result, Err(ArenaError::InvalidConfig(_))));

        let result = DeckAllocator::new(DeckPolicy::GeneratedFair, 0, &mut rng());
        assert!(matches!(result, Err(ArenaError::InvalidConfig(_))));
    }

    #[test]
    fn test_generated_fair_decks() {
        let allocator = DeckAllocator::new(DeckPolicy::GeneratedFair, 25, &mut rng()).unwrap();

        for round in 1..=25 {
            let decks = allocator.decks_for(round);
            assert!(is_two_copy_permutation(&decks.deck_a));
            assert!(is_two_copy_permutation(&decks.deck_b));
            // Same round, same decks for the whole run
            assert_eq!(decks, allocator.decks_for(round));
        }
    }

    #[test]
    fn test_generated_decks_reproducible_from_seed() {
        let first = DeckAllocator::new(DeckPolicy::GeneratedFair, 5, &mut rng()).unwrap();
        let second = DeckAllocator::new(DeckPolicy::GeneratedFair, 5, &mut rng()).unwrap();
        for round in 1..=5 {
            assert_eq!(first.decks_for(round), second.decks_for(round));
        }
    }

    #[test]
    fn test_regenerate_draws_new_decks() {
        let mut source = rng();
        let mut allocator =
            DeckAllocator::new(DeckPolicy::GeneratedFair, 10, &mut source).unwrap();
        let before: Vec<RoundDecks> = (1..=10).map(|r| allocator.decks_for(r)).collect();

        allocator.regenerate(&mut source);
        let after: Vec<RoundDecks> = (1..=10).map(|r| allocator.decks_for(r)).collect();
        assert_ne!(before, after);
    }

    #[test]
    fn test_skewed_rounds_must_fit_tournament() {
        for weak_rounds in [6..=2, 0..=3, 4..=11] {
            let policy = DeckPolicy::GeneratedSkewed {
                weak_side: Side::A,
                weak_rounds,
            };
            let result = DeckAllocator::new(policy, 10, &mut rng());
            assert!(matches!(result, Err(ArenaError::InvalidConfig(_))));
        }

        let policy = DeckPolicy::GeneratedSkewed {
            weak_side: Side::A,
            weak_rounds: 10..=10,
        };
        assert!(DeckAllocator::new(policy, 10, &mut rng()).is_ok());
    }

    #[test]
    fn test_generated_skewed_weak_side() {
        let policy = DeckPolicy::GeneratedSkewed {
            weak_side: Side::B,
            weak_rounds: 1..=5,
        };
        let allocator = DeckAllocator::new(policy, 10, &mut rng()).unwrap();

        let mut weak_total = 0u32;
        for round in 1..=10 {
            let decks = allocator.decks_for(round);
            assert!(is_two_copy_permutation(&decks.deck_a));
            assert_eq!(decks.deck_b.len(), DECK_SIZE);
            assert!(decks.deck_b.cards().iter().all(|c| (1..=9).contains(c)));

            if round <= 5 {
                assert!(decks.label_b.contains("low-skew"));
                weak_total += decks.deck_b.cards().iter().map(|&c| u32::from(c)).sum::<u32>();
            } else {
                assert!(is_two_copy_permutation(&decks.deck_b));
                assert!(decks.label_b.contains("fair"));
            }
        }

        // A fair deck averages 5 per card; the weighted draw averages about 3.7
        let mean = weak_total as f64 / (5 * DECK_SIZE) as f64;
        assert!(mean < 5.0, "weak side mean {} not skewed low", mean);
    }

    #[test]
    fn test_catalogue_owners_follow_swap() {
        let mut allocator =
            DeckAllocator::new(DeckPolicy::FixedPairing, 10, &mut rng()).unwrap();

        let catalogue = allocator.catalogue();
        assert_eq!(catalogue.len(), 20);
        assert_eq!(catalogue[0].owner, Side::A);
        assert_eq!(catalogue[0].label, "Set 1 (AI 1: Set 1-10)");
        assert_eq!(catalogue[10].owner, Side::B);

        allocator.toggle_swap();
        let catalogue = allocator.catalogue();
        assert_eq!(catalogue[0].owner, Side::B);
        assert_eq!(catalogue[0].label, "Set 1 (AI 2: Set 1-10)");
        assert_eq!(catalogue[10].owner, Side::A);
        assert_eq!(
            allocator.pool_summary(),
            ("Set 11-20".to_string(), "Set 1-10".to_string())
        );
    }
}
