pub mod aliases;
pub mod api;
pub mod attachments;
pub mod auth;
pub mod emails;
pub mod health;
pub mod ssl;

pub use api::{AppState, build_router, start_server};
pub use auth::AuthUser;
pub use health::{DatabaseProbe, HealthProbe, HealthState, ObjectStoreProbe};
