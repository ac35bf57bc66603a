pub mod admin;
pub mod cli;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod naming;
pub mod provision;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod seed;
pub mod storage;

#[cfg(test)]
pub mod testing;
