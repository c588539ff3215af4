//! Background Tasks Module
//!
//! # Tasks
//! - Maintenance: expires, evicts and compacts cache entries, then persists the index

mod maintenance;

pub(crate) use maintenance::spawn_maintenance_task;
