//! # Schema Module
//!
//! A small recursive type-descriptor system used by the parameter stages.
//!
//! Descriptors are pure data ([`Descriptor`]) so they can be built and tested
//! without any request machinery. [`validate`] walks a descriptor and a
//! `serde_json::Value` together; [`describe`] renders the label used in
//! `InvalidParameterType` errors.
//!
//! ```rust
//! use serde_json::json;
//! use stagehand::schema::{describe, validate, Descriptor};
//!
//! let ids = Descriptor::array_of(Descriptor::uuid());
//! assert_eq!(describe(&ids), "Array<UUID>");
//! assert!(validate(&json!([]), &ids).unwrap());
//! assert!(!validate(&json!("nope"), &ids).unwrap());
//! ```
//!
//! A descriptor that names an unknown type is a programming mistake in the
//! route declaration, reported as [`SchemaError::UnknownType`] rather than as
//! a data failure.

mod core;

pub use self::core::{coerce_query_value, describe, validate, Descriptor, Primitive, SchemaError};
