// SPDX-License-Identifier: MIT

pub mod catalog;
pub mod config;
pub mod errors;
pub mod filter;
pub mod playlist;
pub mod portal;
pub mod prompts;
pub mod resolver;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use catalog::CatalogFetcher;
pub use config::Config;
pub use errors::PortalError;
pub use portal::{ContentKind, PortalApi, PortalClient};
pub use resolver::LinkResolver;
pub use session::SessionManager;
