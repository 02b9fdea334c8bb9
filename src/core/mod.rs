//! Statistics engine: rate estimation, the counter trie, eviction.
//!
//! - [`RateEstimator`] — tick-driven exponentially weighted moving average
//! - [`Arena`] — generation-checked storage for trie Nodes and Counters
//! - [`AgeList`] — recency order over Nodes, oldest at the tail
//! - [`CounterTrie`] — per-prefix forward/reverse rates, clear and fold
//! - [`report`] — formatted dump of active prefixes

pub mod age_list;
pub mod arena;
pub mod ewma;
pub mod report;
pub mod trie;

pub use age_list::AgeList;
pub use arena::{Arena, Id};
pub use ewma::RateEstimator;
pub use report::CounterRow;
pub use trie::{Counter, CounterTrie, Direction, Node, COUNTER_BYTES, NODE_BYTES};
