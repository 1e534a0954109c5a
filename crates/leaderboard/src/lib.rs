#![doc = include_str!("../README.md")]

mod config;
mod error;
mod index;
mod leaderboard;
mod pipeline;
mod query;
mod rebuilder;
mod score_store;
mod snapshot;
mod types;

pub use crate::config::*;
pub use crate::error::*;
pub use crate::index::*;
pub use crate::leaderboard::*;
pub use crate::pipeline::*;
pub use crate::query::*;
pub use crate::rebuilder::*;
pub use crate::score_store::*;
pub use crate::snapshot::*;
pub use crate::types::*;
