//! Test suite, running against the in-memory storage

mod access;
mod aliases;
mod analytics;
mod expiration;
mod helper;
mod links;
mod redirect;
