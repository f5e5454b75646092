//! Session registry: durable store of sessions and their rounds.

mod connection;
mod helpers;
mod migrations;
pub mod models;
mod repositories;

#[cfg(test)]
mod tests;

pub use connection::Database;
pub use models::{
    AggregateCounts, NewRound, Round, RoundsListing, Session, SessionStatus, SessionWithRounds,
    VideoSource,
};
