//! # Chat order server
//! This crate hosts the HTTP edge of the conversational ordering bot. It is responsible for:
//! Listening for incoming webhook deliveries from the chat platform and verifying their signatures.
//! Parsing the delivery envelope and handing each event to the engine's dispatcher.
//! Sending the dispatcher's replies back out through the platform's messaging API.
//! Talking to the ERP for profiles, customers, the item catalog and sales orders.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/chat/webhook`: The signed webhook route for receiving events from the chat platform.

pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
