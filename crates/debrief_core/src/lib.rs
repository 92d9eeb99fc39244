pub mod ci_health;
pub mod db;
pub mod debrief;
pub mod demo;
pub mod domain;
pub mod enrich;
pub mod error;
pub mod gateway;
pub mod ops;
pub mod timeline;
