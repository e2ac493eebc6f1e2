//! REST API server: refresh endpoints, task inspection, authentication, and
//! OpenAPI documentation.

pub mod auth;
pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod startup;
pub mod state;
