//! Habit, task, goal and journal commands.

use serde::Serialize;
use tracing::debug;

use daybook_core::{
    Goal, GoalDraft, GoalPatch, Habit, HabitDraft, HabitPatch, JournalEntry, JournalEntryDraft,
    JournalEntryPatch, Record, Task, TaskDraft, TaskPatch,
};
use daybook_providers::{ProviderError, Records};

use crate::cli::{GoalAction, HabitAction, JournalAction, TaskAction};
use crate::commands::{Context, value_or_prompt};
use crate::error::{ClientError, ClientResult};
use crate::output::Renderer;

/// What a mutating command did, for the confirmation line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Added,
    Updated,
    Deleted,
}

impl Verb {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "Added",
            Self::Updated => "Updated",
            Self::Deleted => "Deleted",
        }
    }
}

fn confirm<R: Record>(
    ctx: &Context,
    verb: Verb,
    record: &R,
    line: impl FnOnce(&Renderer, &R) -> String,
) -> ClientResult<()> {
    ctx.emit(record, || {
        format!("{} {}:\n  {}", verb.as_str(), R::KIND, line(&ctx.renderer, record))
    })
}

fn confirm_delete<R: Record>(ctx: &Context, id: &str) -> ClientResult<()> {
    #[derive(Serialize)]
    struct Deleted<'a> {
        deleted: &'a str,
    }
    ctx.emit(&Deleted { deleted: id }, || {
        format!("{} {} {}", Verb::Deleted.as_str(), R::KIND, id)
    })
}

/// Looks up one record by id among the signed-in user's records.
async fn find<R: Record>(records: &Records<R>, id: &str) -> ClientResult<R> {
    records
        .list()
        .await?
        .into_iter()
        .find(|r| r.id() == id)
        .ok_or_else(|| ProviderError::not_found(format!("no {} with id {}", R::KIND, id)).into())
}

// ---------------------------------------------------------------------------
// Habits
// ---------------------------------------------------------------------------

pub async fn habits(ctx: &Context, action: HabitAction) -> ClientResult<()> {
    let backend = ctx.backend()?;
    let habits = backend.records::<Habit>().await?;

    match action {
        HabitAction::List => {
            let list = habits.list().await?;
            ctx.emit(&list, || ctx.renderer.habits(&list))
        }
        HabitAction::Add {
            name,
            description,
            frequency,
        } => {
            let draft = HabitDraft {
                name,
                description,
                frequency,
            };
            let habit = habits.insert(&draft).await?;
            confirm(ctx, Verb::Added, &habit, Renderer::habit)
        }
        HabitAction::Update {
            id,
            name,
            description,
            frequency,
        } => {
            let patch = HabitPatch {
                name,
                description,
                frequency,
                ..Default::default()
            };
            let habit = habits.update(&id, &patch).await?;
            confirm(ctx, Verb::Updated, &habit, Renderer::habit)
        }
        HabitAction::Done { id, undo } => {
            let habit = mark_habit(&habits, &id, !undo).await?;
            confirm(ctx, Verb::Updated, &habit, Renderer::habit)
        }
        HabitAction::Rm { id } => {
            habits.delete(&id).await?;
            confirm_delete::<Habit>(ctx, &id)
        }
    }
}

/// Sets a habit's completion, moving its streak with it.
pub async fn mark_habit(habits: &Records<Habit>, id: &str, done: bool) -> ClientResult<Habit> {
    let habit = find(habits, id).await?;
    if habit.completed == done {
        debug!(id, done, "habit already in requested state");
        return Ok(habit);
    }
    Ok(habits.update(id, &habit.completion_patch(done)).await?)
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

pub async fn tasks(ctx: &Context, action: TaskAction) -> ClientResult<()> {
    let backend = ctx.backend()?;
    let tasks = backend.records::<Task>().await?;

    match action {
        TaskAction::List { open } => {
            let mut list = tasks.list().await?;
            if open {
                list.retain(|t| !t.completed);
            }
            ctx.emit(&list, || ctx.renderer.tasks(&list))
        }
        TaskAction::Add {
            title,
            description,
            priority,
            due,
        } => {
            let draft = TaskDraft {
                title,
                description,
                priority,
                due_date: due,
            };
            let task = tasks.insert(&draft).await?;
            confirm(ctx, Verb::Added, &task, Renderer::task)
        }
        TaskAction::Update {
            id,
            title,
            description,
            priority,
            due,
        } => {
            let patch = TaskPatch {
                title,
                description,
                priority,
                due_date: due,
                completed: None,
            };
            let task = tasks.update(&id, &patch).await?;
            confirm(ctx, Verb::Updated, &task, Renderer::task)
        }
        TaskAction::Done { id, undo } => {
            let patch = TaskPatch {
                completed: Some(!undo),
                ..Default::default()
            };
            let task = tasks.update(&id, &patch).await?;
            confirm(ctx, Verb::Updated, &task, Renderer::task)
        }
        TaskAction::Rm { id } => {
            tasks.delete(&id).await?;
            confirm_delete::<Task>(ctx, &id)
        }
    }
}

// ---------------------------------------------------------------------------
// Goals
// ---------------------------------------------------------------------------

pub async fn goals(ctx: &Context, action: GoalAction) -> ClientResult<()> {
    let backend = ctx.backend()?;
    let goals = backend.records::<Goal>().await?;

    match action {
        GoalAction::List => {
            let list = goals.list().await?;
            ctx.emit(&list, || ctx.renderer.goals(&list))
        }
        GoalAction::Add {
            title,
            description,
            category,
            target,
        } => {
            let draft = GoalDraft {
                title,
                description,
                category,
                target_date: target,
            };
            let goal = goals.insert(&draft).await?;
            confirm(ctx, Verb::Added, &goal, Renderer::goal)
        }
        GoalAction::Update {
            id,
            title,
            description,
            category,
            target,
            progress,
        } => {
            let patch = goal_patch(title, description, category, target, progress)?;
            let goal = goals.update(&id, &patch).await?;
            confirm(ctx, Verb::Updated, &goal, Renderer::goal)
        }
        GoalAction::Done { id, undo } => {
            let patch = if undo {
                GoalPatch {
                    completed: Some(false),
                    ..Default::default()
                }
            } else {
                GoalPatch::progress(100).map_err(|e| ClientError::Input(e.to_string()))?
            };
            let goal = goals.update(&id, &patch).await?;
            confirm(ctx, Verb::Updated, &goal, Renderer::goal)
        }
        GoalAction::Rm { id } => {
            goals.delete(&id).await?;
            confirm_delete::<Goal>(ctx, &id)
        }
    }
}

/// Builds an update; a progress value also sets `completed`.
fn goal_patch(
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    target_date: Option<chrono::NaiveDate>,
    progress: Option<u8>,
) -> ClientResult<GoalPatch> {
    let base = match progress {
        Some(p) => GoalPatch::progress(p).map_err(|e| ClientError::Input(e.to_string()))?,
        None => GoalPatch::default(),
    };
    Ok(GoalPatch {
        title,
        description,
        category,
        target_date,
        ..base
    })
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

pub async fn journal(ctx: &Context, action: JournalAction) -> ClientResult<()> {
    let backend = ctx.backend()?;
    let entries = backend.records::<JournalEntry>().await?;

    match action {
        JournalAction::List => {
            let list = entries.list().await?;
            ctx.emit(&list, || ctx.renderer.journal(&list))
        }
        JournalAction::Add {
            title,
            content,
            mood,
        } => {
            let content = value_or_prompt(content, "Entry: ")?;
            let draft = JournalEntryDraft {
                title,
                content,
                mood,
            };
            let entry = entries.insert(&draft).await?;
            confirm(ctx, Verb::Added, &entry, Renderer::journal_entry)
        }
        JournalAction::Update {
            id,
            title,
            content,
            mood,
        } => {
            let patch = JournalEntryPatch {
                title,
                content,
                mood,
            };
            let entry = entries.update(&id, &patch).await?;
            confirm(ctx, Verb::Updated, &entry, Renderer::journal_entry)
        }
        JournalAction::Rm { id } => {
            entries.delete(&id).await?;
            confirm_delete::<JournalEntry>(ctx, &id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_providers::{MemoryStore, ProviderErrorCode};
    use std::sync::Arc;

    fn offline_habits() -> Records<Habit> {
        Records::new(Arc::new(MemoryStore::new()), "local")
    }

    mod habits {
        use super::*;

        #[tokio::test]
        async fn done_bumps_streak_once() {
            let habits = offline_habits();
            let habit = habits.insert(&HabitDraft::new("Read")).await.unwrap();

            let done = mark_habit(&habits, &habit.id, true).await.unwrap();
            assert!(done.completed);
            assert_eq!(done.streak, 1);

            let again = mark_habit(&habits, &habit.id, true).await.unwrap();
            assert_eq!(again.streak, 1);

            let undone = mark_habit(&habits, &habit.id, false).await.unwrap();
            assert!(!undone.completed);
            assert_eq!(undone.streak, 0);
        }

        #[tokio::test]
        async fn unknown_id_is_not_found() {
            let habits = offline_habits();
            let err = mark_habit(&habits, "missing", true).await.unwrap_err();
            let ClientError::Provider(err) = err else {
                panic!("expected a provider error");
            };
            assert_eq!(err.code(), ProviderErrorCode::NotFound);
        }
    }

    mod goals {
        use super::*;

        #[test]
        fn progress_sets_completion() {
            let patch = goal_patch(None, None, None, None, Some(100)).unwrap();
            assert_eq!(patch.completed, Some(true));

            let patch = goal_patch(Some("Run a 10k".into()), None, None, None, Some(30)).unwrap();
            assert_eq!(patch.title.as_deref(), Some("Run a 10k"));
            assert_eq!(patch.completed, Some(false));

            let patch = goal_patch(Some("Run a 10k".into()), None, None, None, None).unwrap();
            assert_eq!(patch.completed, None);
            assert_eq!(patch.progress, None);
        }

        #[test]
        fn out_of_range_progress_is_input_error() {
            let err = goal_patch(None, None, None, None, Some(150)).unwrap_err();
            assert!(matches!(err, ClientError::Input(_)));
        }
    }

    #[test]
    fn verbs() {
        assert_eq!(Verb::Added.as_str(), "Added");
        assert_eq!(Verb::Deleted.as_str(), "Deleted");
    }
}
