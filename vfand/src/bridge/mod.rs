//! The two workers of a live connection
//!
//! - [`PwmPoller`] owns the write half of the link and the per-channel duty state
//! - [`FeedbackListener`] owns the read half and the per-channel RPM state
//!
//! Ownership is split by direction, so the workers share nothing but the
//! cancellation token handed to them by the connection manager.

mod listener;
mod poller;

pub use listener::FeedbackListener;
pub use poller::PwmPoller;
