//! gcpact - action dispatch for GCP certificates, VM power actions and
//! service-account keys.
//!
//! A request is a JSON object with an `action` field plus the fields that
//! action needs. [`dispatch::Dispatcher`] validates it into a typed action
//! for one of three groups and runs it against the matching REST API,
//! always answering with an [`outcome::ActionResponse`].
//!
//! ```ignore
//! use gcpact::config::Settings;
//! use gcpact::dispatch::{Dispatcher, Group};
//! use gcpact::gcp::GcpClient;
//! use serde_json::json;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let settings = Settings::default();
//!     let dispatcher = Dispatcher::new(GcpClient::new(&settings).await?, &settings);
//!     let response = dispatcher
//!         .handle(
//!             Group::Compute,
//!             &json!({"action": "restart", "project": "p", "zone": "us-central1-a", "instance": "vm-1"}),
//!         )
//!         .await;
//!     println!("{}", response.to_json());
//!     Ok(())
//! }
//! ```

pub mod certificate;
pub mod compute;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gcp;
pub mod keys;
pub mod outcome;
pub mod request;
pub mod resource_name;
pub mod secret;
pub mod wait;

pub use dispatch::{Dispatcher, Group};
pub use error::{ActionError, ErrorKind};
pub use outcome::ActionResponse;
