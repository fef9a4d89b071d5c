pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::LatticeError;
pub use types::{
    handle_key, Department, Entity, OrgType, Vibe, Web3Focus, CLASSIFICATION_FRESH_DAYS,
    PROFILE_STALE_HOURS,
};
