//! Containers for records owned by the engine.
//!
//! Socket records are never referenced by pointer. They live in a [`SlotMap`] and every other
//! structure (handle table, timers, a child's parent link) holds a generation-checked [`Key`]. A
//! key outliving its record simply fails to resolve.
//!
//! [`SlotMap`]: slotmap/struct.SlotMap.html
//! [`Key`]: slotmap/struct.Key.html
pub mod slotmap;

pub use self::slotmap::{SlotMap, Key};
