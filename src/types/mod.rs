mod fields;
mod models;
mod role;
mod status;

pub use fields::ChildrenFlag;
pub use models::*;
pub use role::Role;
pub use status::CommunityStatus;
