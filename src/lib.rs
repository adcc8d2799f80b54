//! Operator console for crowdsourced experiment campaigns.
//!
//! A `Session` owns the config, the sandbox/live environment state, the
//! local experiment server and (when networked) the marketplace, ad-host,
//! provisioning and participant collaborators. Console lines are parsed in
//! `cli` and routed by `dispatch` to the workflow that owns them.
pub mod campaign;
pub mod cli;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod environment;
pub mod error;
pub mod ledger;
pub mod prompt;
pub mod provisioning;
pub mod report;
pub mod server;
pub mod services;
pub mod util;

#[cfg(test)]
mod testing;
