pub mod bot;
pub mod commands;
pub mod config;
pub mod demo;
pub mod error;
pub mod events;
pub mod keepalive;
pub mod liveness;
pub mod locks;
pub mod membership;
pub mod moderation;
pub mod policy;
pub mod router;
pub mod status;
pub mod store;
pub mod transport;

pub use bot::Bot;
pub use config::Config;
pub use error::{ConfigError, StoreError, TransportError};
pub use events::Event;
pub use policy::AccessPolicy;
pub use router::EventRouter;
pub use status::{Status, StatusTaxonomy, Tier};
pub use store::{StatusStore, UserRecord};
