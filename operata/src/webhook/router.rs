use std::sync::Arc;

use common::{ContainerLane, Page, Wallet, Workspace};

use crate::queue::DelayQueue;
use crate::state::AppState;
use crate::webhook::{WebhookEvent, sync};

/// How many pages a database.updated event re-inspects.
const DATABASE_SCAN_PAGE_SIZE: u32 = 10;

/// Classifies an inbound event and dispatches it to the synchronizer. The
/// router itself never retries: redeliveries arrive from the sender and the
/// downstream handling is idempotent.
pub async fn handle_event(
    state: &Arc<AppState>,
    queue: &DelayQueue,
    workspace: &Workspace,
    event: &WebhookEvent,
) -> anyhow::Result<()> {
    log::info!(
        "Processing webhook event {} of type {}",
        event.id,
        event.event_type
    );

    if event.is_bot_only() {
        log::info!("Skipping bot-authored event {}", event.id);
        return Ok(());
    }

    match event.event_type.as_str() {
        "page.created" | "page.content_updated" => {
            page_event(state, queue, workspace, event, PageAction::Ingest).await
        }
        "page.properties_updated" => {
            page_event(state, queue, workspace, event, PageAction::SyncStatus).await
        }
        "database.updated" => database_updated(state, queue, workspace, event).await,
        other => {
            log::info!("Dropping event {} with unhandled type {other}", event.id);
            Ok(())
        }
    }
}

enum PageAction {
    Ingest,
    SyncStatus,
}

async fn page_event(
    state: &Arc<AppState>,
    queue: &DelayQueue,
    workspace: &Workspace,
    event: &WebhookEvent,
    action: PageAction,
) -> anyhow::Result<()> {
    let Some(entity) = &event.entity else {
        log::warn!("Event {} is missing its entity", event.id);
        return Ok(());
    };

    let page = state
        .pages
        .retrieve_page(&workspace.notion_token, &entity.id)
        .await?;
    let Some((wallet, lane)) = resolve_lane(state, &page).await? else {
        return Ok(());
    };

    match lane {
        ContainerLane::ScheduledTransaction => match action {
            PageAction::Ingest => {
                sync::ingest_page(state, queue, workspace, &wallet, &page).await
            }
            PageAction::SyncStatus => {
                sync::sync_status(state, queue, workspace, &wallet, &page).await
            }
        },
        lane => {
            log::info!("Page {} belongs to out-of-scope lane {lane:?}", page.id);
            Ok(())
        }
    }
}

/// A database.updated event does not name the changed pages, so the schedule
/// container is re-queried and each recent page fed through the creation
/// path. Per-page failures do not block the remaining pages.
async fn database_updated(
    state: &Arc<AppState>,
    queue: &DelayQueue,
    workspace: &Workspace,
    event: &WebhookEvent,
) -> anyhow::Result<()> {
    let Some(entity) = &event.entity else {
        log::warn!("Event {} is missing its entity", event.id);
        return Ok(());
    };

    let Some(wallet) = state.db.get_wallet_by_container(&entity.id).await? else {
        log::info!("Database {} belongs to no wallet, skipping", entity.id);
        return Ok(());
    };
    if wallet.lane_for_container(&entity.id) != Some(ContainerLane::ScheduledTransaction) {
        log::info!("Database {} is not a schedule container, skipping", entity.id);
        return Ok(());
    }

    let pages = state
        .pages
        .query_recent_pages(&workspace.notion_token, &entity.id, DATABASE_SCAN_PAGE_SIZE)
        .await?;
    for page in &pages {
        if page.parent_database_id() != Some(entity.id.as_str()) {
            continue;
        }
        if let Err(e) = sync::ingest_page(state, queue, workspace, &wallet, page).await {
            log::error!("Failed to ingest page {} from database scan: {e:#}", page.id);
        }
    }
    Ok(())
}

/// Resolves which wallet owns the page's parent container and which
/// per-purpose lane that container is. Pages outside every container are a
/// no-op.
async fn resolve_lane(
    state: &Arc<AppState>,
    page: &Page,
) -> anyhow::Result<Option<(Wallet, ContainerLane)>> {
    let Some(database_id) = page.parent_database_id() else {
        log::info!("Page {} has no parent database", page.id);
        return Ok(None);
    };
    let Some(wallet) = state.db.get_wallet_by_container(database_id).await? else {
        log::info!("Page {} belongs to an unknown database {database_id}", page.id);
        return Ok(None);
    };
    let Some(lane) = wallet.lane_for_container(database_id) else {
        return Ok(None);
    };
    Ok(Some((wallet, lane)))
}
