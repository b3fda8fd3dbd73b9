//! # Memory Descriptor (MD) model
//!
//! ```text
//! md/
//! ├── mod.rs          # This file - re-exports
//! ├── descriptor.rs   # MdId, VarId, Md, MdSpec and the pure overlap/cover relations
//! ├── md_set.rs       # MdSet: sets of MD ids with sentinel-aware queries
//! └── system.rs       # MdSystem registry (interning, overlap closures), OverlapCache
//! ```
//!
//! ## Sentinels
//!
//! | Id | Stands for | Overlaps |
//! |----|------------|----------|
//! | [`MdId::FULL_MEM`] | all memory | everything |
//! | [`MdId::GLOBAL_MEM`] | every global variable | global and imported MDs, sentinels |
//! | [`MdId::IMPORT_MEM`] | every imported variable | imported MDs, sentinels |

mod descriptor;
mod md_set;
mod system;

pub use descriptor::{Md, MdFlags, MdId, MdKind, MdSpec, Sentinel, Storage, VarId};
pub use md_set::MdSet;
pub use system::{MdSystem, OverlapCache, VarInfo};
