//! Action primitives - semantic browser automation on top of the CDP adapter
//!
//! This crate provides the building blocks a verification scenario is written in:
//! - semantic locators (role + name, label, placeholder, text) re-resolved on every use
//! - page actions: navigate, inspect, click, fill, screenshot
//! - bounded, cooperative waits over page conditions

pub mod errors;
mod locator;
mod primitives;
pub mod types;

pub use errors::*;
pub use locator::{check_status, parse_element_state, resolver_script, ScriptOp};
pub use primitives::*;
pub use types::*;
