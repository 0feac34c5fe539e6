//! # HTTP Gateway
//!
//! Exposes the chat completion handler over HTTP: a single `POST` endpoint
//! that streams plain-text completions, plus a `/health` probe.

mod server;

pub use server::{
    GatewayServer, PLAIN_TEXT_UTF8, SharedGateway, router as gateway_router, run as run_gateway,
};
