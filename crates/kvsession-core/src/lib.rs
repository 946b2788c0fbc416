pub mod error;
pub mod config;
pub mod codec;
pub mod store;
pub mod session;
pub mod util;

pub use error::{KvSessionError, Result};
pub use session::{SessionHandler, SessionStore, SessionStoreAdapter};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
