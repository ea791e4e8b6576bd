use actix_web::{web, HttpRequest, HttpResponse, Responder};
use validator::Validate;
use crate::core::DialogueRouter;
use crate::models::{ErrorResponse, EventAccepted, HealthResponse, InboundEvent};
use crate::services::telegram::Update;
use crate::services::{deliver_all, ProfileStore, Transport};
use std::sync::Arc;

/// Header Telegram echoes back when a webhook secret is registered
pub const SECRET_TOKEN_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub router: DialogueRouter,
    pub transport: Arc<dyn Transport>,
    pub profiles: Arc<dyn ProfileStore>,
    pub webhook_secret: Option<String>,
}

/// Configure all event routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/events", web::post().to(post_event))
        .route("/telegram/webhook", web::post().to(telegram_webhook));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let store_healthy = state.profiles.health_check().await.unwrap_or(false);

    let status = if store_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Route one event and deliver what it produced
async fn process(state: &AppState, event: InboundEvent) -> EventAccepted {
    let effects = state.router.handle(event).await;
    let delivered = deliver_all(state.transport.as_ref(), &effects).await;

    if delivered < effects.len() {
        tracing::warn!("Delivered {} of {} effects", delivered, effects.len());
    }

    EventAccepted {
        accepted: true,
        effects: effects.len(),
    }
}

/// Transport-neutral event endpoint
///
/// POST /api/v1/events
///
/// Request body:
/// ```json
/// {
///   "userId": "string",
///   "displayName": "string",
///   "type": "text",
///   "text": "Register"
/// }
/// ```
async fn post_event(
    state: web::Data<AppState>,
    req: web::Json<InboundEvent>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for event from {:?}: {:?}", req.user_id, errors);
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    let event = req.into_inner();
    tracing::debug!("Received {} event for {}", event.payload.kind(), event.user_id);

    HttpResponse::Ok().json(process(&state, event).await)
}

/// Telegram webhook endpoint
///
/// POST /api/v1/telegram/webhook
///
/// Updates the relay does not understand are acknowledged and dropped, so
/// Telegram does not redeliver them.
async fn telegram_webhook(
    state: web::Data<AppState>,
    update: web::Json<Update>,
    http_req: HttpRequest,
) -> impl Responder {
    if let Some(expected) = state.webhook_secret.as_deref() {
        let provided = http_req
            .headers()
            .get(SECRET_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());

        if provided != Some(expected) {
            tracing::warn!("Rejected webhook call with missing or wrong secret token");
            return HttpResponse::Unauthorized().json(ErrorResponse {
                error: "Unauthorized".to_string(),
                message: "Invalid webhook secret token".to_string(),
                status_code: 401,
            });
        }
    }

    let update = update.into_inner();
    let update_id = update.update_id;

    // Answer button presses even when the data is unusable
    if let Some(query) = update.callback_query.as_ref() {
        if let Err(e) = state.transport.acknowledge(&query.id).await {
            tracing::warn!("Failed to answer callback query {}: {}", query.id, e);
        }
    }

    let Some(event) = update.into_event() else {
        tracing::debug!("Ignoring unsupported update {}", update_id);
        return HttpResponse::Ok().json(EventAccepted {
            accepted: false,
            effects: 0,
        });
    };

    if let Err(errors) = event.validate() {
        tracing::info!("Dropping invalid update {}: {}", update_id, errors);
        return HttpResponse::Ok().json(EventAccepted {
            accepted: false,
            effects: 0,
        });
    }

    HttpResponse::Ok().json(process(&state, event).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SessionStore;
    use crate::models::Outbound;
    use crate::services::{MemoryConversationStore, MemoryProfileStore, TransportError};
    use actix_web::{test, App};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Outbound>>,
        acknowledged: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn deliver(&self, effect: &Outbound) -> Result<(), TransportError> {
            self.sent.lock().await.push(effect.clone());
            Ok(())
        }

        async fn acknowledge(&self, callback_id: &str) -> Result<(), TransportError> {
            self.acknowledged.lock().await.push(callback_id.to_string());
            Ok(())
        }
    }

    fn state(webhook_secret: Option<&str>) -> (AppState, Arc<RecordingTransport>) {
        let profiles = Arc::new(MemoryProfileStore::new());
        let conversations = Arc::new(MemoryConversationStore::new());
        let transport = Arc::new(RecordingTransport::default());

        let router = DialogueRouter::assemble(
            profiles.clone(),
            conversations,
            SessionStore::default(),
            1_000.0,
        );

        let state = AppState {
            router,
            transport: transport.clone(),
            profiles,
            webhook_secret: webhook_secret.map(str::to_string),
        };
        (state, transport)
    }

    #[actix_web::test]
    async fn test_health() {
        let (state, _) = state(None);
        let app = test::init_service(
            App::new().app_data(web::Data::new(state)).configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: HealthResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.status, "healthy");
    }

    #[actix_web::test]
    async fn test_post_event_delivers_effects() {
        let (state, transport) = state(None);
        let app = test::init_service(
            App::new().app_data(web::Data::new(state)).configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/events")
            .set_json(serde_json::json!({ "userId": "1", "type": "text", "text": "Register" }))
            .to_request();
        let body: EventAccepted = test::call_and_read_body_json(&app, req).await;

        assert!(body.accepted);
        assert_eq!(body.effects, 1);

        let sent = transport.sent.lock().await;
        assert_eq!(sent[0], Outbound::text("1", crate::core::prompts::ASK_PHOTO));
    }

    #[actix_web::test]
    async fn test_post_event_rejects_invalid_location() {
        let (state, transport) = state(None);
        let app = test::init_service(
            App::new().app_data(web::Data::new(state)).configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/events")
            .set_json(serde_json::json!({
                "userId": "1",
                "type": "location",
                "longitude": 200.0,
                "latitude": 0.0
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 400);
        assert!(transport.sent.lock().await.is_empty());
    }

    #[actix_web::test]
    async fn test_webhook_requires_secret() {
        let (state, _) = state(Some("s3cret"));
        let app = test::init_service(
            App::new().app_data(web::Data::new(state)).configure(configure),
        )
        .await;

        let update = serde_json::json!({
            "update_id": 1,
            "message": { "from": { "id": 5, "first_name": "Eve" }, "text": "/start" }
        });

        let req = test::TestRequest::post()
            .uri("/telegram/webhook")
            .set_json(&update)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);

        let req = test::TestRequest::post()
            .uri("/telegram/webhook")
            .insert_header((SECRET_TOKEN_HEADER, "s3cret"))
            .set_json(&update)
            .to_request();
        let body: EventAccepted = test::call_and_read_body_json(&app, req).await;
        assert!(body.accepted);
        assert_eq!(body.effects, 1);
    }

    #[actix_web::test]
    async fn test_webhook_ignores_unsupported_update() {
        let (state, transport) = state(None);
        let app = test::init_service(
            App::new().app_data(web::Data::new(state)).configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/telegram/webhook")
            .set_json(serde_json::json!({ "update_id": 2 }))
            .to_request();
        let body: EventAccepted = test::call_and_read_body_json(&app, req).await;

        assert!(!body.accepted);
        assert!(transport.sent.lock().await.is_empty());
    }

    #[actix_web::test]
    async fn test_webhook_answers_callback_queries() {
        let (state, transport) = state(None);
        let app = test::init_service(
            App::new().app_data(web::Data::new(state)).configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/telegram/webhook")
            .set_json(serde_json::json!({
                "update_id": 3,
                "callback_query": { "id": "cb-1", "from": { "id": 7, "first_name": "B" }, "data": "view:42" }
            }))
            .to_request();
        let body: EventAccepted = test::call_and_read_body_json(&app, req).await;
        assert!(body.accepted);

        let req = test::TestRequest::post()
            .uri("/telegram/webhook")
            .set_json(serde_json::json!({
                "update_id": 4,
                "callback_query": { "id": "cb-2", "from": { "id": 7, "first_name": "B" }, "data": "unknown" }
            }))
            .to_request();
        let body: EventAccepted = test::call_and_read_body_json(&app, req).await;
        assert!(!body.accepted);

        assert_eq!(*transport.acknowledged.lock().await, vec!["cb-1".to_string(), "cb-2".to_string()]);
    }
}
