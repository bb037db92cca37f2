//! Integration tests against a mock HTTP server.

mod endpoints;
mod function_calling;
mod marshalling;
mod mock_server;
mod registry;
mod streaming;
