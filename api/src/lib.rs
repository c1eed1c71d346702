pub mod api;
pub mod auth;
pub mod chain;
pub mod config;

pub use api::{
    response::{ResponseCode, ResponseWrapper},
    ApiContext,
};
pub use auth::{recv_window::RecvWindowParams, RequestGate};
