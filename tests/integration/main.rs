//! End-to-end tests through the public engine API.

mod pipeline;
mod persistence;
