pub mod filter;
pub mod history;
pub mod model;
pub mod preferences;
pub mod ranking;
pub mod usage;
