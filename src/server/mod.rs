mod admin;
mod communities;
pub mod dto;
pub mod response;
mod router;
pub mod validation;

pub use admin::admin_router;
pub use communities::communities_router;
pub use router::{AppState, create_router};
