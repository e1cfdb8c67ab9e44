pub mod middleware;
pub mod webhook;
