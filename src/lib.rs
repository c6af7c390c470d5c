pub mod blockchain;
pub mod constants;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod merkle;
pub mod messages;
pub mod primitives;
pub mod routing;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod storage;
#[cfg(test)]
mod tests;
