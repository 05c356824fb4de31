pub mod backends;
pub mod client_factory;
pub mod credential;
pub mod dispatcher;
pub mod logger;
pub mod normalizer;
pub mod transform;
