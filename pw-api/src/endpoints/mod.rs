//! Concrete operations used by the realtime subsystem.
//!
//! The wider endpoint catalog (publish, history, push provisioning, channel
//! group admin, ...) lives behind the same [`crate::endpoint::Endpoint`]
//! contract but outside this crate's scope.

pub mod heartbeat;
pub mod here_now;
pub mod leave;
pub mod subscribe;

pub use heartbeat::Heartbeat;
pub use here_now::HereNow;
pub use leave::Leave;
pub use subscribe::Subscribe;
