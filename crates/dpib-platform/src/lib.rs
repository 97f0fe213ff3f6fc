//! dpibench Platform Layer
//!
//! This crate provides a [`ProxyControl`](dpib_core::ProxyControl) that
//! runs ByeDPI as a local child process.
//!
//! ## Supported Platforms
//!
//! - **Linux / macOS / Windows**: any platform that can spawn the
//!   `ciadpi` executable

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub use error::{PlatformError, Result};

pub mod endpoint;
pub use endpoint::{endpoint_from_args, DEFAULT_ENDPOINT};

mod process;
pub use process::{ProcessProxy, DEFAULT_EXECUTABLE};
