// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Phantom-typed engine IDs, image references, target and machine names.

mod id;
mod image_ref;
mod machine_name;
mod target_name;

pub use id::{ContainerId, NetworkId, NodeId, ServiceId, TaskId};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use machine_name::{MachineName, MachineNamer};
pub use target_name::{TargetName, TargetNameError};
