use chrono::NaiveDateTime;

/// Durable backing row for a delayed job. `state` is either `waiting` (due at
/// `run_at`) or `active` (claimed, lease expires at `locked_until`). An active
/// row whose lease has lapsed is considered stalled and goes back to waiting.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueueJobRow {
    pub id: i64,
    pub queue: String,
    pub payload: String,
    pub run_at: NaiveDateTime,
    pub attempts: i64,
    pub max_attempts: i64,
    pub backoff_base_ms: i64,
    pub state: String,
    pub locked_by: Option<String>,
    pub locked_until: Option<NaiveDateTime>,
    pub last_error: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}
