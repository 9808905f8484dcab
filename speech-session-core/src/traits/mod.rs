pub mod backend_port;
pub mod capture_port;
pub mod recognizer;
pub mod transcript_handler;
