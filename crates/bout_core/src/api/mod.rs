pub mod dispatch;
pub mod protocol;

pub use dispatch::apply;
pub use protocol::{Command, Envelope, Outbound, StateSnapshot, TimerAction};
