pub mod category;
pub mod heuristics;
pub mod linker;
pub mod pipeline;
pub mod repair;
pub mod schema;

pub use category::CategoryMapper;
pub use linker::LinkStats;
pub use pipeline::{Classifier, ClassifyStats, ProfileBrief};
pub use schema::{ClassificationResponse, ProfileVibe};
