//! # Authentication Module
//!
//! Credential acquisition for the revision sync engine.
//!
//! ## Overview
//!
//! This module handles the OAuth 2.0 authorization code flow for a desktop
//! application: a loopback callback server receives the browser redirect,
//! PKCE protects the code exchange, and a token cache lets later runs skip
//! the browser entirely.
//!
//! ## Features
//!
//! - OAuth 2.0 authorization flows with PKCE support
//! - Loopback callback server on an ephemeral port
//! - Deadline-bounded acquisition with timeout reporting
//! - Scope verification against the engine's required scopes
//! - Single-flight token refresh when the API rejects a token
//! - Auth progress event emission

pub mod cache;
pub mod error;
pub mod flow;
pub mod provider;
pub mod secrets;
pub mod types;

pub use cache::CachedTokens;
pub use error::{AuthError, Result};
pub use flow::{CallbackServer, OAuthFlow, PkceVerifier};
pub use provider::{CredentialProvider, DEFAULT_ACQUIRE_TIMEOUT};
pub use secrets::ClientSecrets;
pub use types::CredentialSession;
