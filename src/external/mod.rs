pub mod announcer;
pub mod discord;

pub use announcer::*;
pub use discord::*;
