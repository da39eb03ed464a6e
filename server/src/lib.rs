//! Parley Server
//!
//! Permission-checked channel and message API for a self-hosted chat
//! platform. Guild permissions resolve per request from ordered roles; DM
//! conversations grant participants full access.

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod events;
pub mod permissions;
