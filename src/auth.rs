//! Auth-domain value types: authorities, cache keys, secrets, users, and cache items.

pub mod authority;
pub mod key;
pub mod record;
pub mod secret;
pub mod user;

pub use authority::*;
pub use key::*;
pub use record::*;
pub use secret::*;
pub use user::*;
