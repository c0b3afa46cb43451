pub mod platform;
pub mod social_connection;
pub mod user;

pub use platform::Platform;
pub use social_connection::{ConnectionFields, SocialConnection};
pub use user::User;
