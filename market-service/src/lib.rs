pub mod api;
pub mod db;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod schema;
