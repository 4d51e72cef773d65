//! Common utilities and shared types for jobcast.
//!
//! - **Configuration**: Layered settings via [`Config`]
//! - **Error handling**: HTTP-facing error type via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID task identifiers via [`IdGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use jobcast_common::{Config, IdGenerator};
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     let task_id = IdGenerator::new().generate();
//!     println!("queue {} task {}", config.queue.name, task_id);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;

pub use config::{Config, LogFormat};
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
