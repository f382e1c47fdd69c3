pub mod config;
pub mod db;
pub mod error;
pub mod providers;
pub mod sync;

pub use config::Config;
pub use error::SyncError;
pub use sync::SyncService;
