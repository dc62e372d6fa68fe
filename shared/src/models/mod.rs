//! Domain models for the crop growth engine

pub mod crop;
pub mod recipe;
pub mod stage;
pub mod task;

pub use crop::{Crop, CropView};
pub use recipe::Recipe;
pub use stage::{Stage, StageTimestamps};
pub use task::{task_names, TaskConditions, TaskSchedule, FREQUENCY_ONCE, RESOURCE_TYPE_CROPS};
