use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::core::prompts;
use crate::models::{Command, EventPayload, InboundEvent, Outbound};
use crate::services::transport::{Transport, TransportError};

/// Callback data prefix of the "View profile" button
const VIEW_PROFILE_PREFIX: &str = "view:";

/// Telegram Bot API client
///
/// Renders outbound effects as `sendMessage` calls with reply keyboards.
pub struct TelegramClient {
    base_url: String,
    client: Client,
}

impl TelegramClient {
    /// Create a new client for `api_base` (e.g. `https://api.telegram.org`)
    pub fn new(api_base: &str, bot_token: &str, timeout: Duration) -> Result<Self, TransportError> {
        if bot_token.is_empty() {
            return Err(TransportError::Config("bot token is empty".to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), bot_token),
            client,
        })
    }

    async fn call(&self, method: &str, body: &Value) -> Result<(), TransportError> {
        let url = format!("{}/{}", self.base_url, method);

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::ApiError(format!("{} failed: {} {}", method, status, text)));
        }

        Ok(())
    }
}

/// JSON body of the `sendMessage` call for an effect
pub fn render(effect: &Outbound) -> Value {
    match effect {
        Outbound::SendText { user_id, text } => json!({
            "chat_id": user_id,
            "text": text,
        }),
        Outbound::PresentMenu { user_id, options } => json!({
            "chat_id": user_id,
            "text": prompts::MENU,
            "reply_markup": {
                "keyboard": options.iter().map(|o| vec![json!({ "text": o })]).collect::<Vec<_>>(),
                "one_time_keyboard": true,
                "resize_keyboard": true,
            },
        }),
        Outbound::PresentChoices { user_id, prompt, options } => json!({
            "chat_id": user_id,
            "text": prompt,
            "reply_markup": {
                "keyboard": [options.iter().map(|o| json!({ "text": o })).collect::<Vec<_>>()],
                "one_time_keyboard": true,
                "resize_keyboard": true,
            },
        }),
        Outbound::RequestLocation { user_id, prompt } => json!({
            "chat_id": user_id,
            "text": prompt,
            "reply_markup": {
                "keyboard": [[{ "text": "Share location", "request_location": true }]],
                "one_time_keyboard": true,
                "resize_keyboard": true,
            },
        }),
        Outbound::OfferProfileView { user_id, target_user_id, label } => json!({
            "chat_id": user_id,
            "text": label,
            "reply_markup": {
                "inline_keyboard": [[{
                    "text": label,
                    "callback_data": format!("{}{}", VIEW_PROFILE_PREFIX, target_user_id),
                }]],
            },
        }),
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn deliver(&self, effect: &Outbound) -> Result<(), TransportError> {
        self.call("sendMessage", &render(effect)).await
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), TransportError> {
        self.call("answerCallbackQuery", &json!({ "callback_query_id": callback_id }))
            .await
    }
}

/// Subset of a Telegram `Update` the relay understands
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
}

impl User {
    fn display_name(&self) -> Option<String> {
        self.username
            .clone()
            .or_else(|| Some(self.first_name.clone()).filter(|name| !name.is_empty()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramLocation {
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub location: Option<TelegramLocation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub data: Option<String>,
}

impl Update {
    /// Map the update to an inbound event; `None` for anything unsupported
    pub fn into_event(self) -> Option<InboundEvent> {
        if let Some(query) = self.callback_query {
            let target = query.data.as_deref()?.strip_prefix(VIEW_PROFILE_PREFIX)?;
            let mut event = InboundEvent::new(
                query.from.id.to_string(),
                EventPayload::ProfileView {
                    target_user_id: target.to_string(),
                },
            );
            event.display_name = query.from.display_name();
            return Some(event);
        }

        let message = self.message?;
        let from = message.from?;

        let payload = if let Some(location) = message.location {
            EventPayload::Location {
                longitude: location.longitude,
                latitude: location.latitude,
                city: None,
                country: None,
            }
        } else if let Some(photo) = message.photo.filter(|sizes| !sizes.is_empty()) {
            // Telegram lists sizes smallest first
            let largest = photo.into_iter().last()?;
            EventPayload::Photo {
                image_ref: largest.file_id,
            }
        } else {
            let text = message.text?;
            if text.starts_with('/') {
                // Unknown commands are dropped, not relayed
                EventPayload::Command {
                    name: Command::parse(&text)?,
                }
            } else {
                EventPayload::Text { text }
            }
        };

        let mut event = InboundEvent::new(from.id.to_string(), payload);
        event.display_name = from.display_name();
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Option<InboundEvent> {
        serde_json::from_str::<Update>(json).unwrap().into_event()
    }

    #[test]
    fn test_text_update() {
        let event = parse(
            r#"{"update_id":1,"message":{"from":{"id":42,"username":"alice","first_name":"Alice"},"text":"hello"}}"#,
        )
        .unwrap();

        assert_eq!(event.user_id, "42");
        assert_eq!(event.display_name.as_deref(), Some("alice"));
        assert_eq!(event.payload, EventPayload::Text { text: "hello".to_string() });
    }

    #[test]
    fn test_photo_update_uses_largest_size() {
        let event = parse(
            r#"{"update_id":1,"message":{"from":{"id":42,"first_name":"Alice"},"photo":[
                {"file_id":"small","width":90,"height":90},
                {"file_id":"large","width":800,"height":800}
            ]}}"#,
        )
        .unwrap();

        assert_eq!(event.display_name.as_deref(), Some("Alice"));
        assert_eq!(event.payload, EventPayload::Photo { image_ref: "large".to_string() });
    }

    #[test]
    fn test_command_updates() {
        let event = parse(r#"{"update_id":1,"message":{"from":{"id":1,"first_name":"A"},"text":"/cancel"}}"#).unwrap();
        assert_eq!(event.payload, EventPayload::Command { name: Command::Cancel });

        assert!(parse(r#"{"update_id":1,"message":{"from":{"id":1,"first_name":"A"},"text":"/settings"}}"#).is_none());
    }

    #[test]
    fn test_callback_update() {
        let event = parse(
            r#"{"update_id":1,"callback_query":{"id":"cb","from":{"id":7,"first_name":"B"},"data":"view:42"}}"#,
        )
        .unwrap();

        assert_eq!(event.user_id, "7");
        assert_eq!(
            event.payload,
            EventPayload::ProfileView { target_user_id: "42".to_string() }
        );
    }

    #[test]
    fn test_render_menu() {
        let body = render(&Outbound::menu("42"));
        assert_eq!(body["chat_id"], "42");
        assert_eq!(body["reply_markup"]["keyboard"][1][0]["text"], "Search for Match");
    }

    #[test]
    fn test_render_location_request() {
        let body = render(&Outbound::request_location("42", "Where are you?"));
        assert_eq!(body["reply_markup"]["keyboard"][0][0]["request_location"], true);
    }

    #[tokio::test]
    async fn test_deliver_posts_send_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(mockito::Matcher::PartialJson(json!({
                "chat_id": "42",
                "text": "hi",
            })))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let client = TelegramClient::new(&server.url(), "TOKEN", Duration::from_secs(5)).unwrap();
        client.deliver(&Outbound::text("42", "hi")).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_deliver_reports_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .with_status(403)
            .with_body(r#"{"ok":false,"description":"Forbidden: bot was blocked by the user"}"#)
            .create_async()
            .await;

        let client = TelegramClient::new(&server.url(), "TOKEN", Duration::from_secs(5)).unwrap();
        let err = client.deliver(&Outbound::text("42", "hi")).await.unwrap_err();

        assert!(matches!(err, TransportError::ApiError(_)));
    }

    #[tokio::test]
    async fn test_acknowledge_answers_callback_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/answerCallbackQuery")
            .match_body(mockito::Matcher::PartialJson(json!({
                "callback_query_id": "cb",
            })))
            .with_status(200)
            .with_body(r#"{"ok":true,"result":true}"#)
            .create_async()
            .await;

        let client = TelegramClient::new(&server.url(), "TOKEN", Duration::from_secs(5)).unwrap();
        client.acknowledge("cb").await.unwrap();

        mock.assert_async().await;
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(TelegramClient::new("https://api.telegram.org", "", Duration::from_secs(5)).is_err());
    }
}
