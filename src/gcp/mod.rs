//! GCP API interaction module
//!
//! This module provides the transport used by every adapter group:
//! authentication, the REST client and long-running operation polling.
//!
//! # Module Structure
//!
//! - [`auth`] - GCP authentication using Application Default Credentials
//! - [`client`] - Main GCP client for making API requests
//! - [`http`] - HTTP utilities and the [`ApiError`] type
//! - [`operation`] - Long-running operation waits
//!
//! # Example
//!
//! ```ignore
//! use gcpact::config::Settings;
//! use gcpact::gcp::GcpClient;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = GcpClient::new(&Settings::default()).await?;
//!     let instance = client
//!         .get(&client.compute_url("projects/my-project/zones/us-central1-a/instances/vm-1"))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod operation;

pub use auth::GcpCredentials;
pub use client::GcpClient;
pub use http::ApiError;
pub use operation::Operation;
