//! A minimal append-only ledger sealed by proof of work, with an actix-web
//! transport in front of it.

pub mod api;
pub mod config;
pub mod ledger;
