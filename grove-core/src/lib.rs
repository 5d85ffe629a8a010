//! Life-RPG reward and progression engine with an AI collaborator.
//!
//! This crate provides:
//! - Deterministic reward pricing for real-world tasks
//! - Levels, streaks with a forgiveness buffer, and skill unlocks
//! - Inventory, equipment, fusion and real-world binding
//! - An oracle that turns free text into quests, with fixed fallbacks
//! - Versioned save/load
//!
//! # Quick Start
//!
//! ```ignore
//! use grove_core::{GroveConfig, GroveSession};
//! use grove_core::world::Archetype;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GroveConfig::new().with_character_name("Ivy");
//!     let mut session = GroveSession::new(config)?;
//!     session.create_character("Ivy", Archetype::Weaver).await;
//!
//!     session.capture_thought("Finish the garden mural before Friday");
//!     session.settle().await;
//!
//!     session.save("grove.json").await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod inventory;
pub mod oracle;
pub mod patch;
pub mod persist;
pub mod progression;
pub mod quests;
pub mod rewards;
pub mod session;
pub mod skills;
pub mod stats;
pub mod testing;
pub mod world;

// Primary public API
pub use config::{GameRules, GroveConfig, OracleConfig};
pub use oracle::{ClaudeOracle, Collaborator, Oracle, OracleError};
pub use patch::{apply_patch, Applied, Patch};
pub use persist::{PersistError, SavedGrove};
pub use session::{Clock, GroveSession, SessionError, SystemClock};
pub use testing::{FixedClock, ScriptedOracle, TestHarness};
pub use world::GameWorld;
