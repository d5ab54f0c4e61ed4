pub mod client;
pub mod error;
pub mod types;

pub use client::{DocumentService, EditaisClient, attachment_filename};
pub use error::ApiError;
pub use types::{ErrorBody, SubstitutedDocument, TableInfo};
