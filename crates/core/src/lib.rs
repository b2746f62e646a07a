//! Tessera Core - Core types for the Tessera embedded data store.
//!
//! This crate provides the foundational types shared by every other layer:
//!
//! - `Value`: A dynamic, JSON-like payload stored in tables and used as record keys
//! - `Key`: Alias of `Value` used where a value identifies a record
//! - `Error`: The error taxonomy raised by store operations
//!
//! # Example
//!
//! ```rust
//! use tessera_core::Value;
//! use serde_json::json;
//!
//! let user = Value::from(json!({ "name": "Bob", "addID": 1 }));
//!
//! assert_eq!(user.get("name"), Some(&Value::from("Bob")));
//! assert_eq!(user.get("addID"), Some(&Value::Int(1)));
//! assert!(!user.is_scalar());
//! ```

mod error;
mod value;

pub use error::{Error, Result};
pub use value::{Key, Value};
