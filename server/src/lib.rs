//! Parley real-time direct-messaging server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod auth;
pub mod config;
pub mod db;
pub mod dm;
pub mod error;
pub mod presence;
pub mod routes;
pub mod state;
pub mod ws;
