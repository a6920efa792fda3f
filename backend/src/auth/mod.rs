pub mod middleware;
pub mod models;
pub mod password;
pub mod routes;
pub mod service;
