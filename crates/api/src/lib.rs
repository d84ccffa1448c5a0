//! HTTP API of the scheduler: routing, request/response mapping and service wiring.

pub mod app;
