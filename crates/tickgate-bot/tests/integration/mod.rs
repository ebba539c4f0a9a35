//! Integration tests for tickgate-bot.
//!
//! These tests verify the interaction between components:
//! - Stream connection lifecycle against a local server
//! - Tick flow from the socket through the bus
//! - Strategy signals through the risk gate into the ledger

pub mod common;
