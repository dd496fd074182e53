//! # Server Module
//!
//! Transport-facing request and response types. The HTTP server itself lives
//! outside this crate; whatever accepts connections converts each request into
//! a [`RawRequest`], hands it to [`App`](crate::app::App) and writes back the
//! returned [`RawResponse`].

pub mod request;
pub mod response;

pub use request::{parse_cookies, parse_query, HeaderVec, ParamVec, RawRequest, RequestId};
pub use response::RawResponse;
