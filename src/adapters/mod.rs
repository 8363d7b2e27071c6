//! Adapters for converting the APIManager spec into reconcile options

mod redis_options;

pub use redis_options::*;
