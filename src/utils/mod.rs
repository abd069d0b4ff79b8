pub mod duration;
pub mod eligibility;
pub mod presentation;
pub mod winner_selector;

pub use duration::parse_duration;
pub use eligibility::filter_eligible;
pub use winner_selector::{select_winners, select_winners_with};
