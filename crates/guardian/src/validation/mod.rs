//! Schema validation.
//!
//! Untyped input goes through three stages:
//!
//! ```text
//! raw ──► preprocess (trim, "true"/"false" → bool)
//!     ──► sanitize   (drop unknown fields, parse + clamp numbers, normalize enums)
//!     ──► check      (structural match, collects every issue)
//! ```
//!
//! Strict mode skips the first two stages. Coercions are warnings, never
//! rejections; only the final check can fail.

mod check;
mod sanitize;
mod schema;
mod validator;

pub use check::Issue;
pub use schema::{Field, NumberSchema, ObjectSchema, Schema, StringSchema};
pub use validator::{BatchFailure, BatchResult, SchemaValidator, ValidateOptions, ValidationResult};
