pub mod help;
pub mod protocol;
pub mod server;
pub mod tools;
