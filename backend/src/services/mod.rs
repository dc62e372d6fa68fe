//! Business logic services for the Farm Operations Management Platform

pub mod batch;
pub mod crop;
pub mod lifecycle;
pub mod recipe;
pub mod task;

pub use batch::BatchCoordinator;
pub use crop::CropService;
pub use lifecycle::CropLifecycleService;
pub use recipe::RecipeService;
pub use task::TaskFactory;
