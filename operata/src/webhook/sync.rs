use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use common::{AdminStatus, OperataStatus, Page, ScheduledTransaction, Wallet, Workspace};

use crate::queue::{
    DelayQueue, EnqueueOptions, QueueJob, ScheduledTransactionJob, delay_until,
};
use crate::state::AppState;
use crate::webhook::{
    PROP_ADMIN_STATUS, PROP_AMOUNT, PROP_OPERATA_STATUS, PROP_SCHEDULE_DATE, PROP_TO_ADDRESS,
    PROP_TRANSACTION_NAME,
};

/// Fields read off a schedule page. A page that fails extraction is skipped
/// wholesale; a half-read page must never produce a row.
struct PageFields {
    transaction_name: String,
    to_address: String,
    amount: String,
    schedule_date: NaiveDateTime,
    admin_status: AdminStatus,
    operata_status: OperataStatus,
}

fn extract_fields(page: &Page) -> anyhow::Result<PageFields> {
    let transaction_name = page.title(PROP_TRANSACTION_NAME)?.to_string();
    let to_address = page.text(PROP_TO_ADDRESS)?.to_string();
    let raw_amount = page.number(PROP_AMOUNT)?;
    let amount = base_units(raw_amount).ok_or_else(|| {
        anyhow::anyhow!("property `{PROP_AMOUNT}` must be a whole non-negative number, got {raw_amount}")
    })?;
    let schedule_date = page.date(PROP_SCHEDULE_DATE)?;

    // Status selects are operator-writable; unreadable values fall back to
    // the initial state instead of failing the whole page.
    let admin_status = page
        .select_opt(PROP_ADMIN_STATUS)
        .ok()
        .flatten()
        .and_then(|s| AdminStatus::from_str(s).ok())
        .unwrap_or(AdminStatus::Scheduled);
    let operata_status = page
        .select_opt(PROP_OPERATA_STATUS)
        .ok()
        .flatten()
        .and_then(|s| OperataStatus::from_str(s).ok())
        .unwrap_or(OperataStatus::Pending);

    Ok(PageFields {
        transaction_name,
        to_address,
        amount,
        schedule_date,
        admin_status,
        operata_status,
    })
}

/// Amounts are entered as numbers but stored and transferred as a decimal
/// string of whole base units. Fractional or negative amounts are invalid.
fn base_units(amount: f64) -> Option<String> {
    if !amount.is_finite() || amount < 0.0 || amount.fract() != 0.0 {
        return None;
    }
    Some(format!("{}", amount as u64))
}

/// Ingests a created or edited schedule page: validates its fields, upserts
/// the mirrored row keyed by page id, and starts the approval flow when the
/// operator has already approved it. Safe under event replay.
pub async fn ingest_page(
    state: &Arc<AppState>,
    queue: &DelayQueue,
    workspace: &Workspace,
    wallet: &Wallet,
    page: &Page,
) -> anyhow::Result<()> {
    let fields = match extract_fields(page) {
        Ok(fields) => fields,
        Err(e) => {
            log::warn!("Skipping page {}: {e}", page.id);
            return Ok(());
        }
    };

    // Terminal rows are immutable. Any external edit is reconciled by
    // writing the stored statuses back onto the page.
    let existing = state.db.get_scheduled_by_page(&page.id).await?;
    if let Some(existing) = &existing {
        if existing.operata_status.is_terminal() {
            reconcile_terminal(state, workspace, existing).await;
            return Ok(());
        }
    }

    // The pipeline owns the operata status: for an existing row the stored
    // value wins over whatever the page shows, so a replayed approval that
    // already moved the row to Processing cannot enqueue a second job.
    let operata_status = existing
        .map(|e| e.operata_status)
        .unwrap_or(fields.operata_status);

    let row = state
        .db
        .upsert_scheduled(
            &page.id,
            &wallet.id,
            &fields.transaction_name,
            &fields.to_address,
            &fields.amount,
            fields.schedule_date,
            fields.admin_status,
            operata_status,
        )
        .await?;
    log::info!(
        "Synced page {} as scheduled transaction {} ({}/{})",
        page.id,
        row.id,
        row.admin_status.as_str(),
        row.operata_status.as_str()
    );

    if row.admin_status == AdminStatus::Approved && row.operata_status == OperataStatus::Pending {
        approve(state, queue, workspace, &row).await?;
    }
    Ok(())
}

/// Applies status edits from a properties-updated event. Only the two status
/// selects are live here; everything else is handled by the ingest path.
pub async fn sync_status(
    state: &Arc<AppState>,
    queue: &DelayQueue,
    workspace: &Workspace,
    _wallet: &Wallet,
    page: &Page,
) -> anyhow::Result<()> {
    let Some(existing) = state.db.get_scheduled_by_page(&page.id).await? else {
        log::info!("Page {} has no mirrored row, ignoring status edit", page.id);
        return Ok(());
    };

    if existing.operata_status.is_terminal() {
        reconcile_terminal(state, workspace, &existing).await;
        return Ok(());
    }

    let page_admin = page
        .select_opt(PROP_ADMIN_STATUS)
        .ok()
        .flatten()
        .and_then(|s| AdminStatus::from_str(s).ok());
    let page_operata = page
        .select_opt(PROP_OPERATA_STATUS)
        .ok()
        .flatten()
        .and_then(|s| OperataStatus::from_str(s).ok());

    let admin_change = page_admin.filter(|s| *s != existing.admin_status);
    let operata_change = page_operata.filter(|s| *s != existing.operata_status);
    if admin_change.is_none() && operata_change.is_none() {
        return Ok(());
    }

    state
        .db
        .update_scheduled_statuses(existing.id, admin_change, operata_change)
        .await?;
    log::info!(
        "Updated statuses for page {}: admin {:?}, operata {:?}",
        page.id,
        admin_change,
        operata_change
    );

    if admin_change == Some(AdminStatus::Approved)
        && operata_change.unwrap_or(existing.operata_status) == OperataStatus::Pending
    {
        let mut row = existing;
        row.admin_status = AdminStatus::Approved;
        approve(state, queue, workspace, &row).await?;
    }
    Ok(())
}

/// Approval flow: enqueue the transfer to run at its schedule date and move
/// the row to Processing so a replayed approval does not enqueue twice.
async fn approve(
    state: &Arc<AppState>,
    queue: &DelayQueue,
    workspace: &Workspace,
    row: &ScheduledTransaction,
) -> anyhow::Result<()> {
    let job = QueueJob::ScheduledTransaction(ScheduledTransactionJob {
        page_id: row.notion_page_id.clone(),
        wallet_id: row.wallet_id.clone(),
        to_address: row.to_address.clone(),
        amount: row.amount.clone(),
        schedule_date: row.schedule_date,
        transaction_name: row.transaction_name.clone(),
    });
    let options = EnqueueOptions {
        delay_ms: delay_until(row.schedule_date, Utc::now().naive_utc()),
        ..Default::default()
    };
    queue.enqueue(&job, &options).await?;

    state
        .db
        .set_operata_status_by_page(&row.notion_page_id, OperataStatus::Processing)
        .await?;
    state
        .mirror_operata_status(
            &workspace.notion_token,
            &row.notion_page_id,
            OperataStatus::Processing,
        )
        .await;
    log::info!(
        "Approved transaction `{}` for page {}, executing at {}",
        row.transaction_name,
        row.notion_page_id,
        row.schedule_date
    );
    Ok(())
}

/// Force-writes the stored statuses back onto a terminally completed page.
/// The page write is best-effort; the store already holds the truth.
async fn reconcile_terminal(
    state: &Arc<AppState>,
    workspace: &Workspace,
    row: &ScheduledTransaction,
) {
    log::warn!(
        "Page {} edited after reaching {}, restoring statuses",
        row.notion_page_id,
        row.operata_status.as_str()
    );
    if let Err(e) = state
        .pages
        .update_select_properties(
            &workspace.notion_token,
            &row.notion_page_id,
            &[
                (PROP_ADMIN_STATUS, row.admin_status.as_str()),
                (PROP_OPERATA_STATUS, row.operata_status.as_str()),
            ],
        )
        .await
    {
        log::error!(
            "Failed to restore statuses on page {}: {e:#}",
            row.notion_page_id
        );
    }
}
