//! API Module
//!
//! HTTP handlers and routing for the weather cache REST API.
//!
//! # Endpoints
//! - `GET /weather/:location` - Read weather for a location
//! - `DELETE /weather/:location` - Invalidate a cached location
//! - `GET /stats` - Get coordinator statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
