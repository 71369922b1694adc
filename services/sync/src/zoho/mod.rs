pub mod client;
pub mod dao;
pub mod models;
