//! Privileged client for the ejudge contest system.
//!
//! The judge exposes two heterogeneous interfaces: session-cookie
//! authenticated HTML pages (scraped for data) and a token-authenticated
//! JSON API. [`session::EjudgeSession`] owns the credentials and the
//! `SID`/`EJSID` token pair, renews them transparently when the server
//! reports the session invalid, and dispatches page requests;
//! [`api::Api`] covers the JSON methods. The judge-only list queries,
//! mutations and the bulk-rejudge encoding live in [`judge`].

pub mod api;
pub mod config;
pub mod entities;
pub mod error;
pub mod html;
pub mod judge;
pub mod links;
pub mod pages;
pub mod parse;
pub mod session;
pub mod storage;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{AuthData, Config};
pub use error::Error;
pub use session::{EjudgeSession, Sids};
