//! Backend for the RupeeCoin tap game Mini App.
//!
//! Players tap to earn coins, spend them on upgrades and boosters, claim
//! daily rewards, invite friends and climb the leaderboards. The HTTP API
//! lives in [`routes`]; [`tap_client`] is the batching client that talks to it.

pub mod boosters;
pub mod config;
pub mod daily_rewards;
pub mod energy;
pub mod error;
pub mod leaderboard;
pub mod models;
pub mod referrals;
pub mod routes;
pub mod tap_client;
pub mod upgrades;
pub mod users;
