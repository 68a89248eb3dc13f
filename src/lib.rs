//! Simulated-latency backend for exercising a benchmark driver without a
//! real datastore.
//!
//! [`db::Db`] is the operation contract a driver is written against.
//! [`basic::BasicDb`] implements it by waiting out a configurable delay,
//! printing the call when verbose, and returning success.

pub mod basic;
pub mod database;
pub mod db;
pub mod delay;
pub mod metrics;
pub mod properties;
pub mod workload;
