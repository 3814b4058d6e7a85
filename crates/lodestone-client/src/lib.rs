pub mod client;
pub mod config;
pub mod connection;
pub mod world;

pub use client::{connect_stream, query_status, Client};
pub use config::ClientConfig;
pub use connection::Connection;
pub use world::World;
