//! # Registry Frontend
//!
//! A read-only client for browsing container image registries through the docker
//! registry v2 HTTP API.
//!
//! ## Features
//!
//! - Paginated listing of repositories and tags
//! - Tag metadata resolved from schema 1 manifests and their `v1Compatibility` records
//! - Layer sizes cached by digest, shared by every repository and registry
//! - Bulk overviews which report failing entries instead of failing the page
//! - An in-memory store of named registries
//!
//! ## Example
//!
//! ```no_run
//! use registry_frontend::{Registry, RegistryStore};
//!
//! # async fn example() -> Result<(), registry_frontend::Error> {
//! let store = RegistryStore::default();
//! store.add(Registry::new("local", "http://localhost:5000"))?;
//!
//! let client = store.client("local")?;
//! for repository in client.repositories().await? {
//!     for tag in client.tags(&repository).await? {
//!         let info = client.tag(&repository, &tag).await?;
//!         println!("{repository}:{tag} {} layers", info.layers);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod blob;
mod catalog;
mod client;
mod digest;
mod error;
pub mod manifest;
mod options;
mod overview;
mod registry;
mod repository;
mod store;

pub use api_client::{Page, PageState};
pub use blob::{BlobSizeCache, BlobSource};
pub use client::{RegistryClient, cancellable};
pub use digest::Digest;
pub use error::{Error, RegistryResult};
pub use manifest::TagInfo;
pub use options::{ClientOptions, LayerSizePolicy};
pub use overview::{RegistrySummary, RepositorySummary, TagSummary};
pub use registry::{Registry, validate_name};
pub use repository::RepositoryName;
pub use store::{Connector, Network, RegistryStore};
