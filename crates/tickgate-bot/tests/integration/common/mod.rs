//! Shared test fixtures.

// Each test binary uses a different subset.
#![allow(dead_code)]

pub mod mock_ws;
