/// Evalap
///
/// Review service for regional evaluations and activity reports: scoped
/// administrator access, a pending → verified/rejected workflow with an
/// append-only status log, deadline-based lateness and a per-address
/// login guard.

pub mod account;
pub mod admin;
pub mod api;
pub mod audit;
pub mod auth;
pub mod clock;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod scope;
pub mod server;
pub mod submission;

pub use context::AppContext;
