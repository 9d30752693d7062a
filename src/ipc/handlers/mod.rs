pub mod bulletins;
pub mod core;
pub mod import_legacy;
pub mod reports;
pub mod setup;
pub mod students;
