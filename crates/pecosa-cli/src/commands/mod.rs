pub mod queue;
pub mod session;
pub mod sync;
pub mod watch;
