pub mod client;
pub mod endpoint;
pub mod endpoints;
pub mod error;
pub mod types;

pub use client::CrmClient;
pub use error::CrmError;
