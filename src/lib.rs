//! `finwise` is a blocking HTTP client for the FinWise personal finance API.
//!
//! Every call goes through [`RequestExecutor`], which retries rate limiting,
//! server errors, connection failures and timeouts with exponential backoff
//! and surfaces terminal failures as a classified [`FinwiseError`]:
//! - [`FinwiseClient::get`]
//! - [`FinwiseClient::post`]
//! - [`FinwiseClient::patch`]
//! - [`FinwiseClient::delete`]

pub mod backoff;
mod classify;
mod client;
mod config;
mod error;
mod executor;
pub mod transport;

pub use backoff::{Sleeper, ThreadSleeper};
pub use classify::classify;
pub use client::{FinwiseClient, API_KEY_ENV};
pub use config::{ClientConfig, ClientOptions, DEFAULT_BASE_URL};
pub use error::{ApiError, BoxError, ErrorKind, FinwiseError};
pub use executor::{RequestExecutor, REQUEST_ID_HEADER};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};

pub type Result<T> = std::result::Result<T, FinwiseError>;
