//! Per-job credential lifecycle.

mod credential_store;
mod job_credentials;

pub(crate) use credential_store::{CredentialStore, Upsert};
pub(crate) use job_credentials::Credentials;
