pub mod feed;

pub use feed::{clear_ranking_model, get_feed, AppState};
