//! Bearer tokens issued by the signwatch backend.
//!
//! The backend signs its tokens; the client can't verify them and doesn't try.
//! It only reads the claims to decide when a token needs refreshing.
mod claims;
mod pair;
mod store;

pub use claims::*;
pub use pair::*;
pub use store::*;
