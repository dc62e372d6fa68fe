//! Time-triggered task schedules
//!
//! The engine creates task rows describing when something should happen;
//! an external worker polls for due tasks, invokes the matching
//! lifecycle operation, and marks the task inactive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const RESOURCE_TYPE_CROPS: &str = "crops";
pub const FREQUENCY_ONCE: &str = "once";

/// Task names created by the task factory
pub mod task_names {
    pub const STAGE_TRANSITION: &str = "stage_transition";
    pub const BATCH_STAGE_TRANSITION: &str = "batch_stage_transition";
    pub const WATERING_SUSPENSION: &str = "watering_suspension";
    pub const HARVEST_REMINDER: &str = "harvest_reminder";
}

/// Structured payload stored on a task schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConditions {
    pub crop_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_stage: Option<String>,
    /// Every tray in the batch, for batch-wide tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tray_numbers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variety: Option<String>,
}

impl TaskConditions {
    pub fn for_crop(crop_id: Uuid) -> Self {
        TaskConditions {
            crop_id,
            target_stage: None,
            tray_numbers: None,
            variety: None,
        }
    }

    pub fn with_target_stage(mut self, stage: &str) -> Self {
        self.target_stage = Some(stage.to_string());
        self
    }

    pub fn with_batch(mut self, tray_numbers: Vec<String>, variety: &str) -> Self {
        self.tray_numbers = Some(tray_numbers);
        self.variety = Some(variety.to_string());
        self
    }
}

/// A persisted, time-triggered instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSchedule {
    pub id: Uuid,
    pub resource_type: String,
    pub task_name: String,
    pub crop_id: Uuid,
    /// Stage code for transition tasks; empty for other task kinds.
    /// Part of the idempotency key.
    pub target_stage: String,
    pub scheduled_at: DateTime<Utc>,
    pub next_run_at: DateTime<Utc>,
    pub frequency: String,
    pub conditions: serde_json::Value,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
