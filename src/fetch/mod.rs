//! Match fetching pipeline
//!
//! A fetch runs in three stages sharing one [`FetchContext`]:
//! the dispatcher fans profiles out to the match function, the aggregator
//! fans outcomes back in (failing fast), and the streamer pushes the result
//! to the caller one match at a time.
//!
//! [`FetchContext`]: crate::context::FetchContext

pub mod aggregator;
pub mod backend;
pub mod dispatcher;
pub mod sender;
pub mod streamer;

// Re-export commonly used types
pub use aggregator::aggregate;
pub use backend::Backend;
pub use dispatcher::{result_channel, Dispatcher};
pub use sender::MatchSender;
pub use streamer::stream;
