pub mod giveaway_service;

pub use giveaway_service::*;
