//! 削除ルーチンの合成。

pub mod naming;
pub mod plan;
pub mod registry;
pub mod synthesizer;

pub use naming::{routine_name, RoutineNamer};
pub use plan::{DeleteRoutine, DeleteStep, RelationshipEdge, RelationshipKind, TableNode};
pub use registry::{RoutineInventoryEntry, RoutineRegistry};
pub use synthesizer::{DeleteRoutineSynthesizer, SynthesisOptions};
