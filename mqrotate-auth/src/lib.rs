//! AWS authentication for mqrotate
//!
//! Checks AWS Signature Version 4 signatures on requests received by the
//! in-process Secrets Manager test server.

pub mod sigv4;

pub use sigv4::{parse_authorization_header, verify_signature, AuthorizationHeader, SigV4Error};
