pub mod config;
pub mod model;
pub mod naming;
pub mod password;
pub mod runtime;
pub mod schema;
pub mod seed;
pub mod store;
pub mod values;
