pub mod category;
pub mod client;
pub mod export;
pub mod models;
pub mod schema;
