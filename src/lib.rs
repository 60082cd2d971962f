//! HTTP/1.1 wire codec and exchange engine: request-head parsing, chunked
//! and length-delimited body transport, media-type negotiation, a per-path
//! lock registry, and the [`exchange::ExchangeDriver`] that sequences
//! request/response exchanges over a connection.
//!
//! Modules are layered bottom-up: [`byteview`] and [`channel`] give the
//! pull-based byte source every parser reads from; [`request_line`],
//! [`header_parse`], [`header_index`], [`chunked`] and [`body`] build the
//! wire-level parsing and framing on top of that; [`request`], [`response`]
//! and [`handler`] define the request/response value types and the
//! collaborator traits a caller implements; [`exchange`] ties it all
//! together into one connection's worth of request handling.

pub mod body;
pub mod byteview;
pub mod channel;
pub mod chunked;
pub mod config;
pub mod error;
pub mod exchange;
pub mod handler;
pub mod header_index;
pub mod header_parse;
pub mod media_type;
pub mod path_lock;
pub mod request;
pub mod request_line;
pub mod response;
pub mod status;
pub mod version;

pub use config::Config;
pub use error::Error;
pub use exchange::ExchangeDriver;
pub use request::Request;
pub use response::ResponseModel;
pub use version::Version;
