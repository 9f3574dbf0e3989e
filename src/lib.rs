pub mod config;
pub mod db;
pub mod error;
pub mod mapper;
pub mod models;
pub mod repository;
pub mod routes;
pub mod scheduler;
pub mod schema;
pub mod senado;
pub mod state;
pub mod sync;
pub mod telemetry;

pub use scheduler::Scheduler;
pub use sync::SyncService;
