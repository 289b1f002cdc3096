// Library surface for the binary and the integration tests.
pub mod api;
pub mod app_dirs;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod results;
pub mod runtime;
pub mod session;
pub mod tokens;
pub mod transport;
pub mod ui;
pub mod util;
pub mod view;

pub use api::ApiClient;
pub use error::ApiError;
pub use session::{AuthLost, Session};
pub use tokens::{FileTokenStore, MemoryTokenStore, TokenPair, TokenStore};
