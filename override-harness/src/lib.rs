pub mod api;
pub mod client;
pub mod config;
pub mod errors;
pub mod schema;
pub mod session;
pub mod verifier;

// Kept in the library rather than behind cfg(test) so the integration tests under tests/
// can start a stub agent too.
pub mod test_utils;
