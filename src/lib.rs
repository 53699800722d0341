//! Find and replace engine for text buffers.
//!
//! [`TextFinder`] drives a query over whatever buffer a [`ClientProvider`]
//! reports as focused; the [`search`] module holds the engine itself.
pub mod app;
pub mod cli;
pub mod client;
pub mod clipboard;
pub mod config;
pub mod error;
pub mod finder;
pub mod metrics;
pub mod output;
pub mod search;

pub use client::{BufferId, BufferVersion, ClientProvider, StringBuffer, TextClient};
pub use config::Config;
pub use error::{CancelReason, FinderError, Result};
pub use finder::TextFinder;
pub use search::{
    BatchResult, CancellationToken, Direction, FindOutcome, MatchSpan, MultipleReplacement,
    ReplaceResult, ReplacementRule, SearchOptions, SearchScope, SessionPhase,
};
