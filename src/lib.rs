pub mod account;
pub mod api;
pub mod backend;
pub mod config;
pub mod contacts;
pub mod error;
pub mod metrics;
pub mod migrator;
pub mod profile;
pub mod session;
pub mod supabase;
pub mod telemetry;

pub use sea_orm;
