pub mod arena;
pub mod backend;
pub mod deck;
pub mod game;
pub mod results;
pub mod web;

pub use arena::*;
pub use backend::{HttpBackend, MatchBackend};
pub use deck::*;
pub use game::*;
pub use results::*;
