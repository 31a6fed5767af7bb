#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the authflow library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod coordinator;
pub mod error;
pub mod flows;
pub mod models;
pub mod providers;
pub mod resilience;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use coordinator::{AuthCoordinator, AuthCoordinatorBuilder, LoginOutcome};
pub use error::{AuthError, ErrorKind};
pub use models::{AuthResult, AuthenticatedIdentity, LoginOptions, Platform};
pub use session::SessionHandle;
pub use settings::AuthflowSettings;
