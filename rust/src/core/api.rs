// REST backend: the `ChatBackend` seam plus its reqwest implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::models::{MediaType, Message, User};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not authorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// The session token was rejected; callers force a logout.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// Short text suitable for a toast or inline error.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized { message, .. } | ApiError::Status { message, .. } => {
                message.clone()
            }
            ApiError::Transport(_) => "Network unavailable".to_string(),
            ApiError::Decode(_) | ApiError::Url(_) => "Unexpected server response".to_string(),
            ApiError::Io(e) => format!("Could not read file: {e}"),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub username: String,
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingMessage {
    Text {
        receiver_id: String,
        body: String,
    },
    Media {
        receiver_id: String,
        media_type: MediaType,
        file_name: String,
        bytes: Vec<u8>,
        caption: Option<String>,
    },
}

impl OutgoingMessage {
    pub fn receiver_id(&self) -> &str {
        match self {
            OutgoingMessage::Text { receiver_id, .. }
            | OutgoingMessage::Media { receiver_id, .. } => receiver_id,
        }
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// Returns the bearer token.
    async fn login(&self, username: &str, password: &str) -> Result<String, ApiError>;
    async fn register(&self, registration: &Registration) -> Result<(), ApiError>;
    async fn fetch_profile(&self, token: &str) -> Result<User, ApiError>;
    async fn latest_messages(&self, token: &str) -> Result<Vec<Message>, ApiError>;
    async fn thread_messages(&self, token: &str, peer_id: &str) -> Result<Vec<Message>, ApiError>;
    async fn mark_read(&self, token: &str, peer_id: &str) -> Result<(), ApiError>;
    async fn delete_thread(&self, token: &str, peer_id: &str) -> Result<(), ApiError>;
    async fn send_message(&self, token: &str, message: OutgoingMessage) -> Result<(), ApiError>;
    async fn store_push_token(&self, token: &str, push_token: &str) -> Result<(), ApiError>;
    async fn delete_push_token(&self, token: &str, push_token: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "error")]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self, ApiError> {
        let base = Url::parse(base_url)?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let code = status.as_u16();
        let message = resp
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });
        if code == 401 || code == 403 {
            Err(ApiError::Unauthorized {
                status: code,
                message,
            })
        } else {
            Err(ApiError::Status {
                status: code,
                message,
            })
        }
    }

    async fn put_push_token(
        &self,
        segment: &str,
        token: &str,
        push_token: &str,
    ) -> Result<(), ApiError> {
        let resp = self
            .client
            .put(self.endpoint(&[segment])?)
            .bearer_auth(token)
            .json(&serde_json::json!({ "pushToken": push_token }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let resp = self
            .client
            .post(self.endpoint(&["login"])?)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;
        let body: TokenResponse = Self::check(resp).await?.json().await?;
        Ok(body.token)
    }

    async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        let resp = self
            .client
            .post(self.endpoint(&["register"])?)
            .json(registration)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn fetch_profile(&self, token: &str) -> Result<User, ApiError> {
        let resp = self
            .client
            .get(self.endpoint(&["profile"])?)
            .bearer_auth(token)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn latest_messages(&self, token: &str) -> Result<Vec<Message>, ApiError> {
        let resp = self
            .client
            .get(self.endpoint(&["latest-messages"])?)
            .bearer_auth(token)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn thread_messages(&self, token: &str, peer_id: &str) -> Result<Vec<Message>, ApiError> {
        let resp = self
            .client
            .get(self.endpoint(&["messages", peer_id])?)
            .bearer_auth(token)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn mark_read(&self, token: &str, peer_id: &str) -> Result<(), ApiError> {
        let resp = self
            .client
            .put(self.endpoint(&["messages", "mark-read", peer_id])?)
            .bearer_auth(token)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn delete_thread(&self, token: &str, peer_id: &str) -> Result<(), ApiError> {
        let resp = self
            .client
            .delete(self.endpoint(&["messages", peer_id])?)
            .bearer_auth(token)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn send_message(&self, token: &str, message: OutgoingMessage) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.endpoint(&["messages"])?)
            .bearer_auth(token);
        let request = match message {
            OutgoingMessage::Text { receiver_id, body } => request.json(&serde_json::json!({
                "receiverId": receiver_id,
                "message": body,
            })),
            OutgoingMessage::Media {
                receiver_id,
                media_type,
                file_name,
                bytes,
                caption,
            } => {
                let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
                let mut form = reqwest::multipart::Form::new()
                    .text("receiverId", receiver_id)
                    .text("mediaType", media_type.as_str())
                    .part("file", part);
                if let Some(caption) = caption {
                    form = form.text("message", caption);
                }
                request.multipart(form)
            }
        };
        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn store_push_token(&self, token: &str, push_token: &str) -> Result<(), ApiError> {
        self.put_push_token("store-push-token", token, push_token)
            .await
    }

    async fn delete_push_token(&self, token: &str, push_token: &str) -> Result<(), ApiError> {
        self.put_push_token("delete-push-token", token, push_token)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_under_base_path() {
        let backend = HttpBackend::new(reqwest::Client::new(), "https://api.example.com/v1").unwrap();
        assert_eq!(
            backend.endpoint(&["messages", "mark-read", "abc"]).unwrap().as_str(),
            "https://api.example.com/v1/messages/mark-read/abc"
        );

        let root = HttpBackend::new(reqwest::Client::new(), "https://api.example.com").unwrap();
        assert_eq!(
            root.endpoint(&["latest-messages"]).unwrap().as_str(),
            "https://api.example.com/latest-messages"
        );
    }

    #[test]
    fn peer_ids_are_escaped_as_one_segment() {
        let backend = HttpBackend::new(reqwest::Client::new(), "https://api.example.com/").unwrap();
        assert_eq!(
            backend.endpoint(&["messages", "a/b"]).unwrap().as_str(),
            "https://api.example.com/messages/a%2Fb"
        );
    }

    #[test]
    fn only_unauthorized_forces_logout() {
        let auth = ApiError::Unauthorized {
            status: 401,
            message: "jwt expired".into(),
        };
        assert!(auth.is_auth_failure());
        assert!(!ApiError::Transport("reset".into()).is_auth_failure());
        assert!(!ApiError::Status {
            status: 500,
            message: "boom".into()
        }
        .is_auth_failure());
        assert_eq!(
            ApiError::Transport("reset".into()).user_message(),
            "Network unavailable"
        );
    }
}
