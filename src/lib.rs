// Library surface for the binary, headless integration tests and reuse.
// The terminal UI lives in the binary.
pub mod app_dirs;
pub mod config;
pub mod generate;
pub mod pacer;
pub mod reader;
pub mod runtime;
pub mod samples;
pub mod session;
pub mod stats;
pub mod store;
pub mod text;
pub mod util;
