pub mod assembler;
pub mod diversity;
pub mod features;
pub mod proximity_boost;
pub mod recall;
pub mod trainer;

pub use assembler::PersonalizedFeedEngine;
pub use diversity::AuthorDiversityLimiter;
pub use proximity_boost::ProximityBooster;
pub use recall::{CandidateAggregator, CandidateSet, RecallConfig};
pub use trainer::{ModelTrainer, TrainerConfig};
