// Core moderation module - the classifier gateway.
// Same layout as the other core features: models, service, and ports.

pub mod moderation_config;
pub mod moderation_messages;
pub mod moderation_models;
pub mod moderation_service;
pub mod service_lifecycle;

pub use moderation_config::*;
pub use moderation_messages::*;
pub use moderation_models::*;
pub use moderation_service::*;
pub use service_lifecycle::*;
