pub mod slot;
pub mod target;

pub use slot::{SlotCollection, SlotIndex, TimeSlot};
pub use target::{natural_cmp, Target, TargetCatalog};
