//! API Module
//!
//! Admin HTTP surface over a shared cache client.
//!
//! # Endpoints
//! - `PUT /set` - Store a JSON value with optional TTL, tags and jitter
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key
//! - `GET /has/:key` - Check whether a key exists
//! - `POST /invalidate` - Apply an invalidation request
//! - `DELETE /clear` - Remove everything under the namespace
//! - `GET /stats` - Get cache statistics
//! - `POST /stats/reset` - Zero the counters
//! - `GET /health` - Health check including store reachability

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
