//! liveryhub - livery manager core for MSFS 2020/2024
//!
//! Downloads livery packages from the catalog backend, unpacks them into the
//! simulator's Community folder and keeps a local ledger of what is
//! installed where.

pub mod api;
pub mod error;
pub mod installer;
pub mod ledger;
pub mod model;
pub mod paths;
pub mod progress;
pub mod settings;
pub mod updates;
pub mod versions;
