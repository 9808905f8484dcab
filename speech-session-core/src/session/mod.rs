pub mod cancel;
pub mod channel;
pub mod controller;
mod lease;
pub mod stream;
