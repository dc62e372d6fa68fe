//! Task factory for time-triggered crop actions
//!
//! Creates the `once` task rows that an external worker later fires:
//! future stage transitions, the watering-suspension instant, and the
//! harvest reminder. Scheduling is idempotent: planned events are
//! filtered against the active `(crop_id, task_name, target_stage)`
//! keys before insertion, and the partial unique index on that key
//! catches races between concurrent schedulers. A batch boundary is
//! represented by exactly one transition task, anchored to the
//! first-ordered tray.

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::batch::BatchCoordinator;
use crate::services::crop::fetch_crop;
use crate::services::recipe::RecipeService;
use shared::{
    task_names, Crop, Recipe, Stage, TaskConditions, TaskSchedule, FREQUENCY_ONCE,
    RESOURCE_TYPE_CROPS,
};

/// Factory for crop task schedules
#[derive(Clone)]
pub struct TaskFactory {
    db: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    resource_type: String,
    task_name: String,
    crop_id: Uuid,
    target_stage: String,
    scheduled_at: DateTime<Utc>,
    next_run_at: DateTime<Utc>,
    frequency: String,
    conditions: serde_json::Value,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<TaskRow> for TaskSchedule {
    fn from(row: TaskRow) -> Self {
        TaskSchedule {
            id: row.id,
            resource_type: row.resource_type,
            task_name: row.task_name,
            crop_id: row.crop_id,
            target_stage: row.target_stage,
            scheduled_at: row.scheduled_at,
            next_run_at: row.next_run_at,
            frequency: row.frequency,
            conditions: row.conditions,
            description: row.description,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

/// Future events derived from a crop's planting time and recipe
#[derive(Debug, Clone, PartialEq)]
pub struct StagePlan {
    /// Absolute start instants for stages still ahead of the crop
    pub transitions: Vec<(Stage, DateTime<Utc>)>,
    pub harvest_reminder_at: Option<DateTime<Utc>>,
    pub suspend_watering_at: Option<DateTime<Utc>>,
}

/// Compute every future event for a crop at `current` stage. Stages with
/// a zero configured duration get no transition of their own; stages the
/// crop has already reached are skipped.
pub fn plan_stage_events(
    recipe: &Recipe,
    planting_at: DateTime<Utc>,
    current: Stage,
) -> StagePlan {
    let mut transitions = Vec::new();
    for stage in [Stage::Blackout, Stage::Light] {
        if recipe.stage_duration(stage) <= Duration::zero() {
            continue;
        }
        if stage.sort_order() <= current.sort_order() {
            continue;
        }
        if let Some(offset) = recipe.stage_start_offset(stage) {
            transitions.push((stage, planting_at + offset));
        }
    }

    if current.is_terminal() {
        StagePlan {
            transitions,
            harvest_reminder_at: None,
            suspend_watering_at: None,
        }
    } else {
        StagePlan {
            transitions,
            harvest_reminder_at: Some(recipe.expected_harvest_at(planting_at)),
            suspend_watering_at: recipe.suspend_watering_at(planting_at),
        }
    }
}

/// A task the factory intends to insert
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlannedTask {
    pub crop_id: Uuid,
    pub task_name: &'static str,
    pub target_stage: String,
    pub run_at: DateTime<Utc>,
    pub conditions: TaskConditions,
    pub description: String,
}

/// Single-tray stage transition
fn stage_transition_task(
    crop: &Crop,
    recipe: &Recipe,
    target: Stage,
    run_at: DateTime<Utc>,
) -> PlannedTask {
    PlannedTask {
        crop_id: crop.id,
        task_name: task_names::STAGE_TRANSITION,
        target_stage: target.as_str().to_string(),
        run_at,
        conditions: TaskConditions::for_crop(crop.id).with_target_stage(target.as_str()),
        description: format!(
            "Advance {} tray {} to {}",
            recipe.name,
            crop.tray_number,
            target.display_name()
        ),
    }
}

/// Stage transition covering an entire batch, anchored to one member:
/// the conditions embed every tray number and the variety name so one
/// task can act on all siblings at once
fn batch_stage_transition_task(
    anchor: &Crop,
    recipe: &Recipe,
    target: Stage,
    run_at: DateTime<Utc>,
    tray_numbers: Vec<String>,
) -> PlannedTask {
    let tray_count = tray_numbers.len();
    PlannedTask {
        crop_id: anchor.id,
        task_name: task_names::BATCH_STAGE_TRANSITION,
        target_stage: target.as_str().to_string(),
        run_at,
        conditions: TaskConditions::for_crop(anchor.id)
            .with_target_stage(target.as_str())
            .with_batch(tray_numbers, &recipe.name),
        description: format!(
            "Advance {} batch of {} trays to {}",
            recipe.name,
            tray_count,
            target.display_name()
        ),
    }
}

/// The instant at which watering stops ahead of harvest
fn watering_suspension_task(crop: &Crop, recipe: &Recipe, run_at: DateTime<Utc>) -> PlannedTask {
    PlannedTask {
        crop_id: crop.id,
        task_name: task_names::WATERING_SUSPENSION,
        target_stage: String::new(),
        run_at,
        conditions: TaskConditions::for_crop(crop.id),
        description: format!(
            "Suspend watering for {} tray {}",
            recipe.name, crop.tray_number
        ),
    }
}

/// Harvest reminder at the expected harvest instant
fn harvest_reminder_task(crop: &Crop, recipe: &Recipe, run_at: DateTime<Utc>) -> PlannedTask {
    PlannedTask {
        crop_id: crop.id,
        task_name: task_names::HARVEST_REMINDER,
        target_stage: String::new(),
        run_at,
        conditions: TaskConditions::for_crop(crop.id),
        description: format!(
            "Harvest reminder for {} tray {}",
            recipe.name, crop.tray_number
        ),
    }
}

/// Turn a stage plan into the concrete task rows to create. With batch
/// siblings, every transition becomes one batch task anchored to the
/// first member; watering suspension and the harvest reminder stay per
/// crop.
pub(crate) fn plan_tasks(
    crop: &Crop,
    recipe: &Recipe,
    members: &[Crop],
    plan: &StagePlan,
) -> Vec<PlannedTask> {
    let mut planned = Vec::new();

    if members.len() > 1 {
        let anchor = &members[0];
        let tray_numbers: Vec<String> =
            members.iter().map(|m| m.tray_number.clone()).collect();
        for (stage, run_at) in &plan.transitions {
            planned.push(batch_stage_transition_task(
                anchor,
                recipe,
                *stage,
                *run_at,
                tray_numbers.clone(),
            ));
        }
    } else {
        for (stage, run_at) in &plan.transitions {
            planned.push(stage_transition_task(crop, recipe, *stage, *run_at));
        }
    }

    if let Some(run_at) = plan.suspend_watering_at {
        planned.push(watering_suspension_task(crop, recipe, run_at));
    }
    if let Some(run_at) = plan.harvest_reminder_at {
        planned.push(harvest_reminder_task(crop, recipe, run_at));
    }
    planned
}

/// Drop every planned task whose `(crop_id, task_name, target_stage)`
/// key already has an active row. Running the scheduler twice therefore
/// creates nothing the second time.
pub(crate) fn filter_scheduled(
    planned: Vec<PlannedTask>,
    existing: &[(Uuid, String, String)],
) -> Vec<PlannedTask> {
    planned
        .into_iter()
        .filter(|task| {
            !existing.iter().any(|(crop_id, name, stage)| {
                *crop_id == task.crop_id
                    && name == task.task_name
                    && stage == &task.target_stage
            })
        })
        .collect()
}

impl TaskFactory {
    /// Create a new TaskFactory instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create one task per future event for the crop: stage transitions,
    /// watering suspension, and the harvest reminder. Re-running this for
    /// the same crop never duplicates tasks.
    pub async fn schedule_all_stage_tasks(&self, crop_id: Uuid) -> AppResult<Vec<TaskSchedule>> {
        let crop = fetch_crop(&self.db, crop_id).await?;
        let recipe = RecipeService::new(self.db.clone())
            .get_recipe(crop.recipe_id)
            .await?;

        let Some(planting_at) = crop.planting_at else {
            tracing::debug!(crop_id = %crop_id, "crop has no planting time, nothing to schedule");
            return Ok(Vec::new());
        };

        let current = crop.stage_timestamps().calculate_stage();
        let plan = plan_stage_events(&recipe, planting_at, current);

        let members = BatchCoordinator::new(self.db.clone()).members_of(&crop).await?;
        let member_ids: Vec<Uuid> = members.iter().map(|m| m.id).collect();

        if members.len() > 1 {
            self.supersede_per_tray_transitions(&member_ids, members[0].id)
                .await?;
        }

        let existing = self.active_task_keys(&member_ids).await?;
        let planned = filter_scheduled(plan_tasks(&crop, &recipe, &members, &plan), &existing);

        let mut created = Vec::new();
        for task in planned {
            created.extend(self.insert_task(task).await?);
        }

        tracing::info!(crop_id = %crop_id, created = created.len(), "scheduled stage tasks");
        Ok(created)
    }

    /// Deactivate every active task belonging to a crop, whether through
    /// the crop_id column or the conditions payload. Returns the number
    /// deactivated. Called when a crop is deleted or advanced out of
    /// band, so no stale task fires against a crop that already moved on.
    pub async fn delete_tasks_for_crop(&self, crop_id: Uuid) -> AppResult<u64> {
        let count = deactivate_tasks(&self.db, crop_id).await?;
        if count > 0 {
            tracing::info!(crop_id = %crop_id, count, "deactivated crop tasks");
        }
        Ok(count)
    }

    /// Active task schedules, optionally restricted to one crop. This is
    /// the read surface the external worker polls.
    pub async fn list_active_tasks(
        &self,
        crop_id: Option<Uuid>,
    ) -> AppResult<Vec<TaskSchedule>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, resource_type, task_name, crop_id, target_stage,
                   scheduled_at, next_run_at, frequency, conditions,
                   description, is_active, created_at
            FROM task_schedules
            WHERE is_active AND ($1::uuid IS NULL OR crop_id = $1)
            ORDER BY next_run_at
            "#,
        )
        .bind(crop_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(TaskSchedule::from).collect())
    }

    /// Active idempotency keys across a set of crops, fetched in one
    /// round trip for the plan-level duplicate filter
    async fn active_task_keys(
        &self,
        crop_ids: &[Uuid],
    ) -> AppResult<Vec<(Uuid, String, String)>> {
        let keys = sqlx::query_as::<_, (Uuid, String, String)>(
            r#"
            SELECT crop_id, task_name, target_stage
            FROM task_schedules
            WHERE is_active AND crop_id = ANY($1)
            "#,
        )
        .bind(crop_ids)
        .fetch_all(&self.db)
        .await?;

        Ok(keys)
    }

    /// Once a tray has batch siblings, per-tray transition tasks (and
    /// batch tasks anchored elsewhere) would give one boundary two
    /// representations. Fold them into the single batch task on the
    /// anchor member.
    async fn supersede_per_tray_transitions(
        &self,
        member_ids: &[Uuid],
        anchor_id: Uuid,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE task_schedules
            SET is_active = FALSE
            WHERE is_active AND crop_id = ANY($1)
              AND (task_name = $2 OR (task_name = $3 AND crop_id <> $4))
            "#,
        )
        .bind(member_ids)
        .bind(task_names::STAGE_TRANSITION)
        .bind(task_names::BATCH_STAGE_TRANSITION)
        .bind(anchor_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() > 0 {
            tracing::debug!(
                anchor_id = %anchor_id,
                superseded = result.rows_affected(),
                "folded per-tray transition tasks into the batch task"
            );
        }
        Ok(())
    }

    async fn insert_task(&self, task: PlannedTask) -> AppResult<Option<TaskSchedule>> {
        let conditions_json = serde_json::to_value(&task.conditions)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let inserted = sqlx::query_as::<_, TaskRow>(
            r#"
            INSERT INTO task_schedules
                (resource_type, task_name, crop_id, target_stage, scheduled_at,
                 next_run_at, frequency, conditions, description, is_active)
            VALUES ($1, $2, $3, $4, $5, $5, $6, $7, $8, TRUE)
            RETURNING id, resource_type, task_name, crop_id, target_stage,
                      scheduled_at, next_run_at, frequency, conditions,
                      description, is_active, created_at
            "#,
        )
        .bind(RESOURCE_TYPE_CROPS)
        .bind(task.task_name)
        .bind(task.crop_id)
        .bind(&task.target_stage)
        .bind(task.run_at)
        .bind(FREQUENCY_ONCE)
        .bind(&conditions_json)
        .bind(&task.description)
        .fetch_one(&self.db)
        .await;

        match inserted {
            Ok(row) => Ok(Some(row.into())),
            // A concurrent scheduler won the race; the unique index makes
            // that a skip, not an error
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                tracing::debug!(crop_id = %task.crop_id, task_name = task.task_name, "concurrent scheduler created task first");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Deactivate a crop's active tasks on any executor, so callers can run
/// this inside the same transaction as the crop mutation
pub(crate) async fn deactivate_tasks<'e, E>(executor: E, crop_id: Uuid) -> AppResult<u64>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE task_schedules
        SET is_active = FALSE
        WHERE is_active AND (crop_id = $1 OR conditions->>'crop_id' = $2)
        "#,
    )
    .bind(crop_id)
    .bind(crop_id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn recipe(germination: i64, blackout: i64, light: i64, suspend_hours: i64) -> Recipe {
        Recipe {
            id: Uuid::new_v4(),
            name: "Radish".to_string(),
            germination_days: Decimal::from(germination),
            blackout_days: Decimal::from(blackout),
            light_days: Decimal::from(light),
            seed_soak_hours: Decimal::ZERO,
            suspend_water_hours: Decimal::from(suspend_hours),
            days_to_maturity: None,
            lot_id: None,
        }
    }

    fn planted() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap()
    }

    fn crop(recipe_id: Uuid, tray: &str) -> Crop {
        Crop {
            id: Uuid::new_v4(),
            recipe_id,
            tray_number: tray.to_string(),
            tray_count: 1,
            planting_at: Some(planted()),
            soaking_at: None,
            germination_at: Some(planted()),
            blackout_at: None,
            light_at: None,
            harvested_at: None,
            current_stage: Stage::Germination.as_str().to_string(),
            watering_suspended_at: None,
            harvest_weight_grams: None,
            created_at: planted(),
            updated_at: planted(),
        }
    }

    fn keys_of(planned: &[PlannedTask]) -> Vec<(Uuid, String, String)> {
        planned
            .iter()
            .map(|t| (t.crop_id, t.task_name.to_string(), t.target_stage.clone()))
            .collect()
    }

    #[test]
    fn test_plan_covers_all_future_boundaries() {
        let plan = plan_stage_events(&recipe(3, 2, 7, 24), planted(), Stage::Germination);
        assert_eq!(
            plan.transitions,
            vec![
                (Stage::Blackout, planted() + Duration::days(3)),
                (Stage::Light, planted() + Duration::days(5)),
            ]
        );
        assert_eq!(plan.harvest_reminder_at, Some(planted() + Duration::days(12)));
        assert_eq!(
            plan.suspend_watering_at,
            Some(planted() + Duration::days(12) - Duration::hours(24))
        );
    }

    #[test]
    fn test_plan_skips_zero_duration_blackout() {
        let plan = plan_stage_events(&recipe(3, 0, 7, 24), planted(), Stage::Germination);
        assert_eq!(
            plan.transitions,
            vec![(Stage::Light, planted() + Duration::days(3))]
        );
    }

    #[test]
    fn test_plan_skips_stages_already_reached() {
        let plan = plan_stage_events(&recipe(3, 2, 7, 24), planted(), Stage::Light);
        assert!(plan.transitions.is_empty());
        assert!(plan.harvest_reminder_at.is_some());
    }

    #[test]
    fn test_plan_empty_for_harvested_crop() {
        let plan = plan_stage_events(&recipe(3, 2, 7, 24), planted(), Stage::Harvested);
        assert!(plan.transitions.is_empty());
        assert_eq!(plan.harvest_reminder_at, None);
        assert_eq!(plan.suspend_watering_at, None);
    }

    #[test]
    fn test_plan_omits_suspension_when_offset_zero() {
        let plan = plan_stage_events(&recipe(3, 2, 7, 0), planted(), Stage::Germination);
        assert_eq!(plan.suspend_watering_at, None);
    }

    #[test]
    fn test_single_tray_gets_plain_transition_tasks() {
        let r = recipe(3, 2, 7, 24);
        let c = crop(r.id, "A-1");
        let plan = plan_stage_events(&r, planted(), Stage::Germination);
        let planned = plan_tasks(&c, &r, std::slice::from_ref(&c), &plan);

        let transitions: Vec<&PlannedTask> = planned
            .iter()
            .filter(|t| t.task_name == task_names::STAGE_TRANSITION)
            .collect();
        assert_eq!(transitions.len(), 2);
        assert!(transitions.iter().all(|t| t.crop_id == c.id));
        assert!(!planned
            .iter()
            .any(|t| t.task_name == task_names::BATCH_STAGE_TRANSITION));
    }

    #[test]
    fn test_batch_boundary_has_single_representation() {
        let r = recipe(3, 2, 7, 24);
        let members = vec![crop(r.id, "A-1"), crop(r.id, "A-2"), crop(r.id, "A-3")];
        let plan = plan_stage_events(&r, planted(), Stage::Germination);

        // Scheduling through a later tray still anchors to the first one
        let planned = plan_tasks(&members[2], &r, &members, &plan);

        let transitions: Vec<&PlannedTask> = planned
            .iter()
            .filter(|t| t.task_name == task_names::BATCH_STAGE_TRANSITION)
            .collect();
        assert_eq!(transitions.len(), 2);
        for t in &transitions {
            assert_eq!(t.crop_id, members[0].id);
            assert_eq!(
                t.conditions.tray_numbers.as_deref(),
                Some(&["A-1".to_string(), "A-2".to_string(), "A-3".to_string()][..])
            );
        }
        assert!(!planned
            .iter()
            .any(|t| t.task_name == task_names::STAGE_TRANSITION));
    }

    #[test]
    fn test_rescheduling_creates_nothing_new() {
        let r = recipe(3, 2, 7, 24);
        let members = vec![crop(r.id, "A-1"), crop(r.id, "A-2")];
        let plan = plan_stage_events(&r, planted(), Stage::Germination);

        let first = plan_tasks(&members[0], &r, &members, &plan);
        assert!(!first.is_empty());

        // Second run sees the first run's tasks as active and plans none
        let second = filter_scheduled(
            plan_tasks(&members[0], &r, &members, &plan),
            &keys_of(&first),
        );
        assert!(second.is_empty());
    }

    #[test]
    fn test_filter_keeps_events_not_yet_scheduled() {
        let r = recipe(3, 2, 7, 24);
        let c = crop(r.id, "A-1");
        let plan = plan_stage_events(&r, planted(), Stage::Germination);

        let planned = plan_tasks(&c, &r, std::slice::from_ref(&c), &plan);
        let existing = keys_of(&planned[..1]);

        let remaining = filter_scheduled(planned.clone(), &existing);
        assert_eq!(remaining.len(), planned.len() - 1);
        assert!(!remaining.contains(&planned[0]));
    }

    #[test]
    fn test_replanning_after_advance_drops_passed_boundary() {
        let r = recipe(3, 2, 7, 24);
        let mut c = crop(r.id, "A-1");
        c.blackout_at = Some(planted() + Duration::days(3));
        c.update_current_stage();

        let plan = plan_stage_events(
            &r,
            planted(),
            c.stage_timestamps().calculate_stage(),
        );
        let planned = plan_tasks(&c, &r, std::slice::from_ref(&c), &plan);

        // Only the light boundary remains; nothing targets blackout again
        assert!(planned
            .iter()
            .all(|t| t.target_stage != Stage::Blackout.as_str()));
        assert!(planned
            .iter()
            .any(|t| t.target_stage == Stage::Light.as_str()));
    }
}
