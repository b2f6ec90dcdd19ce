use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

/// Error body returned by the server.
#[derive(Debug, Clone)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

#[derive(Debug)]
pub enum SdkError {
    Http(reqwest::Error),
    Api(ApiFailure),
    NotLoggedIn,
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdkError::Http(e) => write!(f, "request failed: {e}"),
            SdkError::Api(failure) => write!(
                f,
                "server returned {} ({}): {}",
                failure.status, failure.code, failure.message
            ),
            SdkError::NotLoggedIn => write!(f, "no session token, call login first"),
        }
    }
}

impl std::error::Error for SdkError {}

impl From<reqwest::Error> for SdkError {
    fn from(e: reqwest::Error) -> Self {
        SdkError::Http(e)
    }
}

impl SdkError {
    /// HTTP status when the server answered with an error body.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SdkError::Api(failure) => Some(failure.status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            SdkError::Api(failure) => Some(&failure.code),
            _ => None,
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;

/// Client bound to one server and, after `login`, one session.
///
/// Responses are returned as `serde_json::Value` so the SDK does not pin the
/// server's model types.
#[derive(Clone)]
pub struct CrmClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl CrmClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/api/v1{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> SdkResult<T> {
        let resp = builder.send().await?;
        let resp = check(resp).await?;
        Ok(resp.json().await?)
    }

    async fn send_empty(&self, builder: RequestBuilder) -> SdkResult<()> {
        let resp = builder.send().await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn get(&self, path: &str) -> SdkResult<Value> {
        self.send(self.request(Method::GET, path)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> SdkResult<Value> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> SdkResult<Value> {
        self.send(self.request(Method::PATCH, path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> SdkResult<()> {
        self.send_empty(self.request(Method::DELETE, path)).await
    }

    /// Open a session and keep its token for later calls.
    pub async fn login(&mut self, tenant: &str, email: &str, password: &str) -> SdkResult<Value> {
        let body = json!({ "tenant": tenant, "email": email, "password": password });
        let resp: Value = self.post("/auth/login", &body).await?;
        self.token = resp["token"].as_str().map(str::to_string);
        Ok(resp)
    }

    pub async fn logout(&mut self) -> SdkResult<()> {
        if self.token.is_none() {
            return Err(SdkError::NotLoggedIn);
        }
        self.send_empty(self.request(Method::POST, "/auth/logout"))
            .await?;
        self.token = None;
        Ok(())
    }

    pub async fn me(&self) -> SdkResult<Value> {
        self.get("/auth/me").await
    }

    pub async fn create_tenant(&self, tenant: &Value) -> SdkResult<Value> {
        self.post("/tenants", tenant).await
    }

    pub async fn create_user(&self, user: &Value) -> SdkResult<Value> {
        self.post("/users", user).await
    }

    pub async fn create_lead(&self, lead: &Value) -> SdkResult<Value> {
        self.post("/leads", lead).await
    }

    pub async fn get_lead(&self, id: &str) -> SdkResult<Value> {
        self.get(&format!("/leads/{id}")).await
    }

    /// List leads; `query` is appended verbatim, e.g. `category=qualified&page=2`.
    pub async fn list_leads(&self, query: &str) -> SdkResult<Value> {
        if query.is_empty() {
            self.get("/leads").await
        } else {
            self.get(&format!("/leads?{query}")).await
        }
    }

    pub async fn board(&self) -> SdkResult<Value> {
        self.get("/leads/board").await
    }

    pub async fn change_category(
        &self,
        id: &str,
        category: &str,
        expected_version: Option<u64>,
    ) -> SdkResult<Value> {
        let body = json!({ "category": category, "expected_version": expected_version });
        self.post(&format!("/leads/{id}/category"), &body).await
    }

    pub async fn assign(&self, id: &str, user_id: &str) -> SdkResult<Value> {
        self.post(&format!("/leads/{id}/assign"), &json!({ "user_id": user_id }))
            .await
    }

    pub async fn log_interaction(&self, lead_id: &str, kind: &str, body: &str) -> SdkResult<Value> {
        let payload = json!({ "kind": kind, "body": body });
        self.post(&format!("/leads/{lead_id}/activities"), &payload)
            .await
    }

    pub async fn activities(&self, lead_id: &str) -> SdkResult<Value> {
        self.get(&format!("/leads/{lead_id}/activities")).await
    }

    pub async fn create_quote(&self, quote: &Value) -> SdkResult<Value> {
        self.post("/quotes", quote).await
    }

    pub async fn send_quote(&self, id: &str) -> SdkResult<Value> {
        self.post(&format!("/quotes/{id}/send"), &json!({})).await
    }

    pub async fn accept_quote(&self, id: &str) -> SdkResult<Value> {
        self.post(&format!("/quotes/{id}/accept"), &json!({})).await
    }

    pub async fn upload_attachment(
        &self,
        lead_id: &str,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> SdkResult<Value> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        self.send(
            self.request(Method::POST, &format!("/leads/{lead_id}/attachments"))
                .multipart(form),
        )
        .await
    }

    pub async fn download_attachment(&self, id: &str) -> SdkResult<Vec<u8>> {
        let resp = self
            .request(Method::GET, &format!("/attachments/{id}"))
            .send()
            .await?;
        let resp = check(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }
}

async fn check(resp: Response) -> SdkResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    let error = &body["error"];
    Err(SdkError::Api(ApiFailure {
        status,
        code: error["code"].as_str().unwrap_or("unknown").to_string(),
        message: error["message"].as_str().unwrap_or_default().to_string(),
        details: error.get("details").cloned(),
    }))
}
