//! Incident lifecycle core.
//!
//! Moves incident records through open → resolved → closed (or
//! open → canceled), keeps one reminder timer per active incident, and fans
//! lifecycle notices out to the incident channel and auxiliary destinations.
//!
//! Persistence and chat are behind [`IncidentStore`] and [`ChannelClient`];
//! in-memory implementations of both ship with the crate.

pub mod channel;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod notice;
pub mod policy;
pub mod reminder;
pub mod scheduler;
pub mod store;
pub mod transition;
pub mod types;

pub use channel::{ChannelClient, MemoryChannel};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use engine::{EditOutcome, LifecycleEngine};
pub use error::{ChannelError, ConfigError, DeliveryError, LifecycleError, ReminderError, StoreError};
pub use fanout::{Fanout, FanoutReport};
pub use reminder::{FiringOutcome, ReminderJob};
pub use scheduler::ReminderScheduler;
pub use store::{IncidentStore, MemoryStore};
pub use types::{Incident, IncidentDraft, IncidentStatus};
