pub mod bulletin;
pub mod db;
pub mod error;
pub mod gradebook;
pub mod ipc;
pub mod legacy;
pub mod store;
