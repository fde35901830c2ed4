//! HTTP surface: the gateway's webhooks plus health and metrics endpoints.

pub mod handler;
pub mod webhook;
