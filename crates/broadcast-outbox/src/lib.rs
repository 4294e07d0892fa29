//! Build-and-dispatch pipeline for campaign broadcasts.
//!
//! This crate provides:
//! - BatchBuilder: assembles and serializes recipient messages chunk by chunk
//! - DispatchCoordinator: fans chunks out to the channel and sums the results
//! - HttpChannelClient: one HTTP request per dispatch chunk
//! - BroadcastPipeline: the entry point joining builder and coordinator

mod builder;
mod coordinator;
mod error;
mod pipeline;
mod sender;

pub use builder::{AttributeLookup, AttributeMap, BatchBuilder, BuildReport};
pub use coordinator::{CompletionCallback, DispatchCoordinator, DispatchHandle};
pub use error::{BuildError, BuildResult, ChannelError, ChannelResult, LookupError};
pub use pipeline::BroadcastPipeline;
pub use sender::{ChannelClient, HttpChannelClient, SendOutcome};
