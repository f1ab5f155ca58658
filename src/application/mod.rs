pub mod bootstrap;
pub mod calendar_source;
pub mod engine;
pub mod ports;
pub mod refresh;
pub mod token_auth;

#[cfg(test)]
mod testing;
