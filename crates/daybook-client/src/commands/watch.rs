//! `daybook watch`: follow a record list as changes arrive.

use chrono::Local;
use serde::Serialize;
use tracing::{info, warn};

use daybook_core::{Change, ChangeKind, Goal, Habit, JournalEntry, LiveList, Record, Task};
use daybook_providers::{ProviderError, ProviderErrorCode, ProviderResult, Subscription};

use crate::backend::{Backend, BackendKind};
use crate::cli::WatchList;
use crate::commands::Context;
use crate::error::{ClientError, ClientResult};
use crate::output::Renderer;

pub async fn run(ctx: &Context, list: WatchList) -> ClientResult<()> {
    match list {
        WatchList::Habits => follow::<Habit>(ctx, Renderer::habits).await,
        WatchList::Tasks => follow::<Task>(ctx, Renderer::tasks).await,
        WatchList::Goals => follow::<Goal>(ctx, Renderer::goals).await,
        WatchList::Journal => follow::<JournalEntry>(ctx, Renderer::journal).await,
    }
}

/// Prints the list, then re-prints it after every change until Ctrl-C or
/// until the subscription ends.
///
/// In `--json` mode each change is printed as one JSON line instead.
async fn follow<R: Record>(
    ctx: &Context,
    render: fn(&Renderer, &[R]) -> String,
) -> ClientResult<()> {
    let backend = ctx.backend()?;
    ensure_pushes_changes(&backend)?;
    let records = backend.records::<R>().await?;
    let (mut live, mut subscription) = records.watch().await?;
    info!(kind = %R::KIND, count = live.len(), "watching");

    if !ctx.json {
        print_snapshot(ctx, &live, render, None);
        eprintln!("Watching {}; press Ctrl-C to stop.", R::KIND.table());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("stopped by Ctrl-C");
                break;
            }
            next = next_change::<R>(&mut subscription) => match next {
                None => {
                    warn!(kind = %R::KIND, "change feed closed");
                    break;
                }
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(change)) => {
                    if ctx.json {
                        println!("{}", change_line(&change)?);
                    }
                    let label = format!("{} {}", change_verb(change.kind), change.id);
                    if apply(&mut live, change) && !ctx.json {
                        print_snapshot(ctx, &live, render, Some(&label));
                    }
                }
            }
        }
    }
    Ok(())
}

/// The offline store only notifies subscribers inside the same process, so
/// edits made by another `daybook` run would never show up.
fn ensure_pushes_changes(backend: &Backend) -> ClientResult<()> {
    match backend.kind() {
        BackendKind::Supabase => Ok(()),
        BackendKind::Offline(path) => Err(ClientError::Input(format!(
            "watch needs the Supabase backend; changes to {} made by other runs are not pushed",
            path.display()
        ))),
    }
}

/// Next usable change. Rows that fail to decode are logged and skipped.
async fn next_change<R: Record>(
    subscription: &mut Subscription,
) -> Option<ProviderResult<Change<R>>> {
    loop {
        match subscription.recv_typed::<R>().await? {
            Err(e) if is_bad_row(&e) => {
                warn!(kind = %R::KIND, error = %e, "skipping undecodable change");
            }
            next => return Some(next),
        }
    }
}

fn is_bad_row(err: &ProviderError) -> bool {
    matches!(
        err.code(),
        ProviderErrorCode::InvalidResponse | ProviderErrorCode::ValidationFailed
    )
}

fn change_verb(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Insert => "inserted",
        ChangeKind::Update => "updated",
        ChangeKind::Delete => "deleted",
    }
}

/// Merges one change; returns true if the list changed.
fn apply<R: Record>(live: &mut LiveList<R>, change: Change<R>) -> bool {
    live.apply(change)
}

/// One line of `watch --json` output.
#[derive(Serialize)]
struct ChangeLine<'a, R> {
    kind: ChangeKind,
    table: &'static str,
    id: &'a str,
    record: Option<&'a R>,
}

fn change_line<R: Record>(change: &Change<R>) -> ClientResult<String> {
    Ok(serde_json::to_string(&ChangeLine {
        kind: change.kind,
        table: R::KIND.table(),
        id: &change.id,
        record: change.record.as_ref(),
    })?)
}

fn print_snapshot<R: Record>(
    ctx: &Context,
    live: &LiveList<R>,
    render: fn(&Renderer, &[R]) -> String,
    cause: Option<&str>,
) {
    if let Some(cause) = cause {
        println!();
        println!("-- {} {} --", Local::now().format("%H:%M:%S"), cause);
    }
    println!("{}", render(&ctx.renderer, live.items()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_core::{RecordKind, TaskDraft};
    use daybook_providers::{MemoryStore, Records};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn live_list_follows_store_changes() {
        let store = Arc::new(MemoryStore::new());
        let tasks: Records<Task> = Records::new(store, "local");
        let first = tasks.insert(&TaskDraft::new("Existing")).await.unwrap();

        let (mut live, mut subscription) = tasks.watch().await.unwrap();
        assert_eq!(live.len(), 1);

        let added = tasks.insert(&TaskDraft::new("New")).await.unwrap();
        tasks.delete(&first.id).await.unwrap();

        for _ in 0..2 {
            let change =
                tokio::time::timeout(Duration::from_secs(2), next_change::<Task>(&mut subscription))
                    .await
                    .unwrap()
                    .unwrap()
                    .unwrap();
            assert!(apply(&mut live, change));
        }

        assert_eq!(live.len(), 1);
        assert_eq!(live.items()[0].id, added.id);
    }

    #[test]
    fn json_change_line() {
        let change: Change<Task> = Change::delete("t1");
        let line = change_line(&change).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["kind"], "DELETE");
        assert_eq!(value["table"], "tasks");
        assert_eq!(value["id"], "t1");
        assert!(value["record"].is_null());
        assert_eq!(change_verb(change.kind), "deleted");
    }

    mod feed {
        use super::*;

        fn feed(items: Vec<ProviderResult<Change>>) -> Subscription {
            let (tx, rx) = mpsc::channel(items.len().max(1));
            for item in items {
                tx.try_send(item).unwrap();
            }
            Subscription::new(RecordKind::Task, rx, tokio::spawn(async {}))
        }

        #[tokio::test]
        async fn undecodable_row_is_skipped() {
            let mut subscription = feed(vec![
                Ok(Change::insert("t1", json!({"id": "t1", "title": 42}))),
                Err(ProviderError::invalid_response("malformed frame")),
                Ok(Change::insert(
                    "t2",
                    json!({
                        "id": "t2",
                        "user_id": "u-1",
                        "title": "Ship it",
                        "created_at": "2024-01-01T10:00:00Z",
                        "updated_at": "2024-01-01T10:00:00Z"
                    }),
                )),
            ]);

            let change = next_change::<Task>(&mut subscription).await.unwrap().unwrap();
            assert_eq!(change.id, "t2");
            assert!(next_change::<Task>(&mut subscription).await.is_none());
        }

        #[tokio::test]
        async fn connection_errors_still_end_the_watch() {
            let mut subscription = feed(vec![Err(ProviderError::network("socket closed"))]);
            let err = next_change::<Task>(&mut subscription).await.unwrap().unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::NetworkError);
        }
    }

    mod backend {
        use super::*;
        use daybook_providers::MemoryIdentity;

        #[test]
        fn offline_backend_is_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let backend = Backend::offline(dir.path().join("offline.json")).unwrap();
            let err = ensure_pushes_changes(&backend).unwrap_err();
            assert!(matches!(err, ClientError::Input(_)));
            assert!(err.to_string().contains("watch needs the Supabase backend"));
        }

        #[test]
        fn supabase_backend_is_accepted() {
            let backend = Backend::from_parts(
                BackendKind::Supabase,
                Arc::new(MemoryIdentity::new()),
                Arc::new(MemoryStore::new()),
            );
            assert!(ensure_pushes_changes(&backend).is_ok());
        }
    }
}
