use std::{
    path::Path,
    sync::{PoisonError, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use chat_shared::{
    domain::ConversationId,
    protocol::{
        CredentialsRequest, LoginResponse, MessagePayload, RegisterResponse, UploadResponse,
        UserSummary,
    },
};
use reqwest::{
    multipart::{Form, Part},
    Client, RequestBuilder,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{config::ClientSettings, error::ClientError};

/// File contents read up front so the upload task owns no file handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|err| ClientError::FileAccess(format!("{}: {err}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }
}

#[async_trait]
pub trait RequestGateway: Send + Sync {
    /// Takes effect for every request issued after it returns.
    fn set_token(&self, token: Option<String>);
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ClientError>;
    async fn register(&self, username: &str, password: &str)
        -> Result<RegisterResponse, ClientError>;
    async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>, ClientError>;
    async fn get_history(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<MessagePayload>, ClientError>;
    async fn upload_file(&self, upload: FileUpload) -> Result<UploadResponse, ClientError>;
}

pub struct HttpGateway {
    http: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ClientError::Network(format!("failed to build http client: {err}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidEndpoint(format!(
                "{base_url}: server url must start with http:// or https://"
            )));
        }
        Ok(Self {
            http,
            base_url,
            token: RwLock::new(None),
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ClientError> {
        Self::new(settings.base_url.clone(), settings.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
        {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            debug!(status = status.as_u16(), "gateway: request rejected");
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|err| ClientError::Decode(err.to_string()))
    }
}

#[async_trait]
impl RequestGateway for HttpGateway {
    fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let request = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&CredentialsRequest {
                username: username.to_string(),
                password: password.to_string(),
            });
        Self::execute(request).await
    }

    async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<RegisterResponse, ClientError> {
        let request = self
            .http
            .post(self.url("/api/auth/register"))
            .json(&CredentialsRequest {
                username: username.to_string(),
                password: password.to_string(),
            });
        Self::execute(request).await
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>, ClientError> {
        let request = self
            .http
            .get(self.url("/api/users/search"))
            .query(&[("q", query)]);
        Self::execute(self.authorized(request)).await
    }

    async fn get_history(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<MessagePayload>, ClientError> {
        let request = self
            .http
            .get(self.url(&format!("/api/chat/{conversation_id}/messages")));
        Self::execute(self.authorized(request)).await
    }

    async fn upload_file(&self, upload: FileUpload) -> Result<UploadResponse, ClientError> {
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.mime_type)
            .map_err(|err| ClientError::FileAccess(format!("{}: {err}", upload.mime_type)))?;
        let request = self
            .http
            .post(self.url("/api/upload"))
            .multipart(Form::new().part("file", part));
        Self::execute(self.authorized(request)).await
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
