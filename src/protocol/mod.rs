//! Console Protocol
//!
//! Client-server communication over HTTP with JSON bodies.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                     SQL Console HTTP                        |
//! +-------------------------------------------------------------+
//! |  Public:                                                    |
//! |    - GET  /health                                           |
//! |    - POST {base}/login                                      |
//! |  Session cookie required:                                   |
//! |    - POST {base}/logout                                     |
//! |    - POST {base}/execute-query                              |
//! |    - GET  {base}/logs?limit=N                               |
//! |    - GET  {base}/autocomplete?alias=&sql=                   |
//! |    - GET  {base}/autocomplete-tables?prefix=                |
//! +-------------------------------------------------------------+
//! ```
//!
//! # Module Structure
//!
//! - `rest` - router, session middleware, handlers and DTOs

pub mod rest;

pub use rest::{create_router, start_http_server, AppState, SessionContext};
