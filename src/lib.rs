pub mod collector;
pub mod config;
pub mod db;
pub mod estimator;
pub mod notifier;
pub mod persister;
pub mod process_info;
pub mod protocol;
pub mod recommender;
pub mod sampler;
pub mod socket;
pub mod summary;
