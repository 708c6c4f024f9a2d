//! # vend-session
//!
//! Credential lifecycle for the vend storefront: keeps a short-lived
//! bearer credential valid across any number of concurrent consumers.
//!
//! The [`RefreshCoordinator`] owns the refresh state machine and the
//! single-flight renewal guarantee: proactive (timer-driven) and reactive
//! (rejected-request) renewals share one in-flight exchange, so the
//! renewal endpoint is called at most once at a time. A failed exchange
//! against the durable credential drives one terminal sign-out that every
//! waiter and observer sees.
//!
//! Collaborators are injected: [`RenewalClient`] for the network exchange
//! (production impl: [`HttpRenewalClient`] over reqwest),
//! [`DurableSource`] for the long-lived secret (production impl:
//! [`DurableCredentialStore`] — OS keychain with file fallback), and
//! [`CredentialStore`] as the synchronized holder the outbound-request
//! layer reads through.

pub mod claims;
pub mod coordinator;
pub mod credential;
pub mod durable;
pub mod error;
pub mod renew;
pub mod scheduler;
pub mod store;

pub use coordinator::{RefreshCoordinator, RefreshState, SignOutReason};
pub use credential::{Credential, DurableCredential};
pub use durable::{DurableCredentialStore, DurableSource, StaticDurableSource};
pub use error::SessionError;
pub use renew::{HttpRenewalClient, RenewalClient};
pub use scheduler::RefreshScheduler;
pub use store::CredentialStore;
