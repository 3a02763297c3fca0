use std::sync::Arc;

use actix_web::{HttpResponse, get, post, web};

use crate::queue::DelayQueue;
use crate::state::AppState;
use crate::webhook::{WebhookEvent, router};

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Webhook receiver. The sender only cares about the status code: 200 means
/// delivered, anything else means redeliver later.
#[post("/api/notion/webhook/{workspace_id}")]
pub async fn notion_webhook(
    state: web::Data<Arc<AppState>>,
    queue: web::Data<DelayQueue>,
    path: web::Path<String>,
    event: web::Json<WebhookEvent>,
) -> HttpResponse {
    let workspace_id = path.into_inner();

    let workspace = match state.db.get_workspace(&workspace_id).await {
        Ok(Some(workspace)) => workspace,
        Ok(None) => {
            log::warn!("Webhook for unknown workspace {workspace_id}");
            return HttpResponse::NotFound()
                .json(serde_json::json!({ "error": "Workspace not found" }));
        }
        Err(e) => {
            log::error!("Failed to load workspace {workspace_id}: {e:#}");
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "Internal server error" }));
        }
    };

    match router::handle_event(state.get_ref(), queue.get_ref(), &workspace, &event).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "received": true })),
        Err(e) => {
            log::error!("Failed to process webhook event {}: {e:#}", event.id);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "Internal server error" }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SCHEDULED_TX_QUEUE;
    use crate::testutil::harness;
    use actix_web::{App, test};

    #[actix_web::test]
    async fn unknown_workspace_is_a_404() {
        let h = harness().await;
        let queue = DelayQueue::new(h.state.db.clone(), SCHEDULED_TX_QUEUE);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(h.state.clone()))
                .app_data(web::Data::new(queue))
                .service(notion_webhook),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/api/notion/webhook/no-such-workspace")
            .set_json(serde_json::json!({
                "id": "evt-1",
                "type": "page.created",
                "entity": { "id": "page-1", "type": "page" },
            }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn known_workspace_acknowledges_the_delivery() {
        let h = harness().await;
        let queue = DelayQueue::new(h.state.db.clone(), SCHEDULED_TX_QUEUE);
        let workspace_id = h.workspace.id.clone();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(h.state.clone()))
                .app_data(web::Data::new(queue))
                .service(notion_webhook),
        )
        .await;

        // unknown event types are dropped but still acknowledged
        let request = test::TestRequest::post()
            .uri(&format!("/api/notion/webhook/{workspace_id}"))
            .set_json(serde_json::json!({
                "id": "evt-1",
                "type": "comment.created",
            }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert!(response.status().is_success());
    }
}
