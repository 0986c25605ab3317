//! Test utilities for mqrotate
//!
//! In-process HTTP servers standing in for the rotation's collaborators:
//! - `FakeBroker`: the broker's `/api/users/{name}` management endpoint
//! - `SecretsManagerServer`: the Secrets Manager JSON protocol, as spoken by
//!   the AWS SDK, over an `InMemorySecretStore`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mqrotate_test::FakeBroker;
//!
//! #[tokio::test]
//! async fn test_login() {
//!     let broker = FakeBroker::start().await;
//!     broker.add_user("svc", "old");
//!
//!     println!("Broker running at: {}", broker.url());
//! }
//! ```

pub mod broker;
pub mod secrets;
pub mod server;

pub use broker::{FakeBroker, UpdateCall};
pub use secrets::SecretsManagerServer;
pub use server::TestServer;
