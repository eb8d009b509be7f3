use std::sync::RwLock;
use std::time::Duration;

use anyhow::{bail, format_err, Error};
use http::header::HeaderValue;
use http::{Request, Response};
use hyper::client::{Client as HyperClient, HttpConnector};
use hyper::Body;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use serde_json::{json, Value};

use proxmox_http::client::HttpsConnector;
use proxmox_http::uri::{build_authority, json_object_to_query};

use crate::error::HypervisorError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(2 * 60);
const TCP_KEEPALIVE_TIME: u32 = 120;

#[derive(Debug, Clone)]
struct AuthInfo {
    ticket: String,
    csrf_token: String,
}

/// A signed-in session against one Proxmox VE node's REST API.
///
/// Carries the ticket and `CSRFPreventionToken` behind a lock rather than
/// the periodic background renewal the PBS client uses: session lifetime
/// here is managed entirely on demand, by retrying once on a 401 (see
/// [`Client::request`]), matching the original tool's
/// `ProxmoxResource._request` ("received 401, the session may have
/// expired, retry renewing it, retry original request once").
pub struct Client {
    http: HyperClient<HttpsConnector>,
    server: String,
    port: u16,
    user: String,
    password: String,
    auth: RwLock<Option<AuthInfo>>,
}

impl Client {
    pub fn new(server: &str, port: u16, user: &str, password: &str, verify_ssl: bool) -> Result<Self, Error> {
        let mut ssl_connector_builder = SslConnector::builder(SslMethod::tls())?;
        if verify_ssl {
            ssl_connector_builder.set_verify(SslVerifyMode::PEER);
        } else {
            ssl_connector_builder.set_verify(SslVerifyMode::NONE);
        }

        let mut httpc = HttpConnector::new();
        httpc.set_nodelay(true);
        httpc.enforce_http(false);
        httpc.set_connect_timeout(Some(Duration::new(10, 0)));

        let https = HttpsConnector::with_connector(httpc, ssl_connector_builder.build(), TCP_KEEPALIVE_TIME);
        let http = HyperClient::builder().build::<_, Body>(https);

        Ok(Self {
            http,
            server: server.to_string(),
            port,
            user: user.to_string(),
            password: password.to_string(),
            auth: RwLock::new(None),
        })
    }

    /// `POST /access/ticket`: trade username/password for a ticket and
    /// CSRF token (spec §4.2's "transparent session renewal").
    async fn authenticate(&self) -> Result<AuthInfo, Error> {
        let data = json!({ "username": self.user, "password": self.password });
        let req = self.request_builder("POST", "access/ticket", Some(data))?;
        let body = Self::send(&self.http, req).await?;
        let auth = AuthInfo {
            ticket: body["data"]["ticket"]
                .as_str()
                .ok_or_else(|| format_err!("login response missing ticket"))?
                .to_string(),
            csrf_token: body["data"]["CSRFPreventionToken"]
                .as_str()
                .ok_or_else(|| format_err!("login response missing CSRFPreventionToken"))?
                .to_string(),
        };
        *self.auth.write().unwrap() = Some(auth.clone());
        Ok(auth)
    }

    async fn current_auth(&self) -> Result<AuthInfo, Error> {
        if let Some(auth) = self.auth.read().unwrap().clone() {
            return Ok(auth);
        }
        self.authenticate().await
    }

    fn apply_auth(req: &mut Request<Body>, auth: &AuthInfo) {
        req.headers_mut().insert(
            "Cookie",
            HeaderValue::from_str(&format!("PVEAuthCookie={}", auth.ticket)).unwrap(),
        );
        req.headers_mut().insert(
            "CSRFPreventionToken",
            HeaderValue::from_str(&auth.csrf_token).unwrap(),
        );
    }

    /// Issue one request, re-authenticating and retrying exactly once if
    /// the server signals the session has expired (spec §4.2).
    async fn request(&self, method: &str, path: &str, data: Option<Value>) -> Result<Value, Error> {
        let auth = self.current_auth().await?;
        let mut req = self.request_builder(method, path, data.clone())?;
        Self::apply_auth(&mut req, &auth);

        match Self::send(&self.http, req).await {
            Ok(value) => Ok(value),
            Err(err) if is_session_expired(&err) => {
                log::debug!("session expired on {method} {path}, re-authenticating and retrying once");
                let auth = self.authenticate().await?;
                let mut req = self.request_builder(method, path, data)?;
                Self::apply_auth(&mut req, &auth);
                Self::send(&self.http, req).await
            }
            Err(err) => Err(err),
        }
    }

    pub async fn get(&self, path: &str, params: Option<Value>) -> Result<Value, Error> {
        self.request("GET", path, params).await
    }

    pub async fn post(&self, path: &str, data: Option<Value>) -> Result<Value, Error> {
        self.request("POST", path, data).await
    }

    pub async fn delete(&self, path: &str, params: Option<Value>) -> Result<Value, Error> {
        self.request("DELETE", path, params).await
    }

    /// POST/PUT send `data` as a form-urlencoded body; GET/DELETE send it as
    /// a query string, matching the split in the upstream client's own
    /// `request_builder`.
    fn request_builder(&self, method: &str, path: &str, data: Option<Value>) -> Result<Request<Body>, Error> {
        let path = format!("api2/json/{}", path.trim_matches('/'));

        if method == "POST" || method == "PUT" {
            let url = self.build_uri(&path, None)?;
            let body = match data {
                Some(data) => Body::from(json_object_to_query(data)?),
                None => Body::empty(),
            };
            Ok(Request::builder()
                .method(method)
                .uri(url)
                .header(hyper::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body)?)
        } else {
            let query = data.map(json_object_to_query).transpose()?;
            let url = self.build_uri(&path, query)?;
            Ok(Request::builder().method(method).uri(url).body(Body::empty())?)
        }
    }

    fn build_uri(&self, path: &str, query: Option<String>) -> Result<http::Uri, Error> {
        http::Uri::builder()
            .scheme("https")
            .authority(build_authority(&self.server, self.port)?)
            .path_and_query(match query {
                Some(query) => format!("/{path}?{query}"),
                None => format!("/{path}"),
            })
            .build()
            .map_err(|err| format_err!("error building uri - {err}"))
    }

    async fn send(http: &HyperClient<HttpsConnector>, req: Request<Body>) -> Result<Value, Error> {
        let resp = tokio::time::timeout(HTTP_TIMEOUT, http.request(req))
            .await
            .map_err(|_| format_err!("http request timed out"))??;
        Self::response_to_value(resp).await
    }

    async fn response_to_value(response: Response<Body>) -> Result<Value, Error> {
        let status = response.status();
        let data = hyper::body::to_bytes(response.into_body()).await?;
        let text = String::from_utf8_lossy(&data).into_owned();
        if status.is_success() {
            if text.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(serde_json::from_str(&text)?)
            }
        } else if status == http::StatusCode::UNAUTHORIZED {
            Err(Error::from(HypervisorError::SessionExpired))
        } else {
            bail!("hypervisor API returned {status}: {text}");
        }
    }
}

fn is_session_expired(err: &Error) -> bool {
    matches!(err.downcast_ref::<HypervisorError>(), Some(HypervisorError::SessionExpired))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_401_as_session_expired() {
        let err = Error::from(HypervisorError::SessionExpired);
        assert!(is_session_expired(&err));
        let err = format_err!("not found");
        assert!(!is_session_expired(&err));
    }
}
