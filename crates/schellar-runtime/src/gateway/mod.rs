//! REST API for schedule management.

mod handlers;
mod response;
mod server;

pub use response::{ApiMessage, ApiResult, MessageBody};
pub use server::{AppState, GatewayServer};
