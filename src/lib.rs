//! Whiskers: a productivity assistant server with an LLM-backed chat,
//! task and note management, and token-based auth.

#![deny(unsafe_code)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(non_upper_case_globals)]
#![deny(nonstandard_style)]
#![deny(unused_must_use)]
#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::panic)]
#![warn(clippy::print_stdout)]

/// The chat assistant: tools, reassembly, sessions.
pub mod assistant;
/// Configuration, errors, ids, and domain models.
pub mod core;
/// Upstream language-model client and wire types.
pub mod llm;
/// HTTP server and API routes.
pub mod server;
/// Entry helpers to start the agent.
pub mod startup;
/// `SQLite`-backed persistence.
pub mod storage;
