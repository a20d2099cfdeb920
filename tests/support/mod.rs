//! Shared test support for integration tests.

#![allow(dead_code)]

pub mod fake_page;
