pub mod giveaway;

pub use giveaway::giveaway_config;
