use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::base::{RequestAuth, TrackerCore};
use crate::error::{Result, TrackerError};
use crate::http::{with_query, HttpRequest, HttpResponse};
use crate::page::{self, Page};

/// Persisted credentials and session of a private tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub cookies: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_string: Option<String>,
}

/// How a site logs users in.
#[derive(Debug, Clone, Copy)]
pub struct LoginSpec {
    /// Login form URL; `{origin}` is replaced by `scheme://domain` of the page.
    pub url: &'static str,
    /// Cookie set on a successful login.
    pub auth_cookie: Option<&'static str>,
    /// Query parameter carrying the session id after a successful login.
    pub auth_qs_param: Option<&'static str>,
    pub form: fn(&str, &str) -> Vec<(String, String)>,
    /// Hidden input of the login page (phpBB `sid`) whose value is submitted
    /// with the form and appended to the login URL.
    pub login_token: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    LoginSubmitted,
    Authenticated,
}

struct SessionState {
    state: AuthState,
    settings: AuthSettings,
    changed: bool,
}

/// Login state machine of a private tracker.
pub struct AuthSession {
    spec: LoginSpec,
    inner: Mutex<SessionState>,
}

impl AuthSession {
    pub fn new(spec: LoginSpec, settings: AuthSettings) -> Self {
        Self {
            spec,
            inner: Mutex::new(SessionState {
                state: AuthState::Anonymous,
                settings,
                changed: false,
            }),
        }
    }

    pub fn state(&self) -> AuthState {
        self.inner.lock().state
    }

    pub fn settings(&self) -> AuthSettings {
        self.inner.lock().settings.clone()
    }

    /// Settings changed by a login since the last call.
    pub fn take_update(&self) -> Option<AuthSettings> {
        let mut inner = self.inner.lock();
        if !inner.changed {
            return None;
        }
        inner.changed = false;
        Some(inner.settings.clone())
    }

    pub fn request_auth(&self) -> RequestAuth {
        let inner = self.inner.lock();
        let query = match (self.spec.auth_qs_param, &inner.settings.query_string) {
            (Some(param), Some(value)) if !value.is_empty() => Some(format!("{}={}", param, value)),
            _ => None,
        };
        RequestAuth {
            cookies: inner.settings.cookies.clone(),
            query,
        }
    }

    /// The page showed the anonymous view: whatever session we had is stale.
    pub fn mark_anonymous(&self) {
        let mut inner = self.inner.lock();
        if inner.state == AuthState::Authenticated {
            tracing::debug!("Session expired, logging in again");
        }
        inner.state = AuthState::Anonymous;
    }

    /// Submit the login form once. Success is an auth cookie in the response or
    /// the session parameter in the redirect target.
    pub async fn login(&self, core: &TrackerCore, page_url: &str) -> Result<()> {
        let origin =
            page::origin(page_url).ok_or_else(|| TrackerError::InvalidUrl(page_url.to_string()))?;
        let login_url = self.spec.url.replace("{origin}", &origin);

        let (username, password, cookies) = {
            let mut inner = self.inner.lock();
            inner.state = AuthState::LoginSubmitted;
            (
                inner.settings.username.clone(),
                inner.settings.password.clone(),
                inner.settings.cookies.clone(),
            )
        };

        let (Some(username), Some(password)) = (username, password) else {
            self.inner.lock().state = AuthState::Anonymous;
            return Err(TrackerError::Authentication(format!(
                "{}: no credentials configured",
                core.alias()
            )));
        };

        let response = match self.submit(core, &login_url, &username, &password, cookies).await {
            Ok(response) => response,
            Err(e) => {
                self.inner.lock().state = AuthState::Anonymous;
                return Err(e);
            }
        };

        let session_id = self
            .spec
            .auth_qs_param
            .and_then(|param| page::query_param(&response.url, param));
        let has_cookie = self
            .spec
            .auth_cookie
            .is_some_and(|name| response.cookies.contains_key(name));

        let mut inner = self.inner.lock();
        if !has_cookie && session_id.is_none() {
            inner.state = AuthState::Anonymous;
            tracing::warn!("Login with given credentials failed at {}", core.alias());
            return Err(TrackerError::Authentication(login_url));
        }

        inner.settings.cookies.extend(response.cookies);
        if session_id.is_some() {
            inner.settings.query_string = session_id;
        }
        inner.state = AuthState::Authenticated;
        inner.changed = true;
        tracing::debug!("Login is successful at {}", core.alias());

        Ok(())
    }

    /// Post the login form, scraping the login token first when the site uses one.
    async fn submit(
        &self,
        core: &TrackerCore,
        login_url: &str,
        username: &str,
        password: &str,
        mut cookies: BTreeMap<String, String>,
    ) -> Result<HttpResponse> {
        let mut url = login_url.to_string();
        let mut form = (self.spec.form)(username, password);

        if let Some(name) = self.spec.login_token {
            let response = core
                .request(HttpRequest::get(login_url).cookies(cookies.clone()), None)
                .await?;
            let page = Page::new(response.url.clone(), response.decode(core.encoding()));
            let token = page
                .select_attr(&format!(r#"input[name="{}"]"#, name), "value")
                .into_iter()
                .next()
                .ok_or_else(|| {
                    TrackerError::Authentication(format!("no `{}` field at {}", name, login_url))
                })?;
            cookies.extend(response.cookies);
            url = with_query(&url, Some(&format!("{}={}", name, token)));
            form.push((name.to_string(), token));
        }

        tracing::debug!("Trying to login at {} ...", url);

        // Cookies set on a 302 are lost if the redirect is followed.
        let request = HttpRequest::post(&url, form)
            .cookies(cookies)
            .follow_redirects(self.spec.auth_qs_param.is_some());
        core.request(request, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpClient, HttpConfig};
    use crate::test_support::{serve, Hits};
    use axum::extract::Query;
    use axum::http::HeaderMap;
    use axum::response::{IntoResponse, Redirect};
    use axum::routing::{get, post};
    use axum::{Form, Router};

    fn form(user: &str, password: &str) -> Vec<(String, String)> {
        vec![
            ("user".to_string(), user.to_string()),
            ("pass".to_string(), password.to_string()),
        ]
    }

    fn credentials() -> AuthSettings {
        AuthSettings {
            username: Some("idle".into()),
            password: Some("secret".into()),
            ..Default::default()
        }
    }

    fn core() -> TrackerCore {
        TrackerCore::new("test", Vec::new(), HttpClient::new(HttpConfig::default()).unwrap())
    }

    async fn cookie_login(Form(fields): Form<BTreeMap<String, String>>) -> impl IntoResponse {
        if fields.get("pass").map(String::as_str) == Some("secret") {
            (
                [("set-cookie", "bb_session=s3ss; Path=/")],
                Redirect::to("/index.php"),
            )
                .into_response()
        } else {
            "login form again".into_response()
        }
    }

    #[tokio::test]
    async fn test_cookie_login() {
        let base = serve(Router::new().route("/login.php", post(cookie_login))).await;
        let spec = LoginSpec {
            url: "{origin}/login.php",
            auth_cookie: Some("bb_session"),
            auth_qs_param: None,
            form,
            login_token: None,
        };
        let session = AuthSession::new(spec, credentials());

        session.login(&core(), &format!("{}/topic", base)).await.unwrap();

        assert_eq!(session.state(), AuthState::Authenticated);
        assert_eq!(
            session.request_auth().cookies.get("bb_session").map(String::as_str),
            Some("s3ss")
        );
        let update = session.take_update().unwrap();
        assert_eq!(update.cookies.get("bb_session").map(String::as_str), Some("s3ss"));
        assert!(session.take_update().is_none());
    }

    #[tokio::test]
    async fn test_query_string_login() {
        let base = serve(
            Router::new()
                .route(
                    "/login.php",
                    post(|| async { Redirect::to("/index.php?sid=abc123") }),
                )
                .route("/index.php", get(|| async { "welcome" })),
        )
        .await;
        let spec = LoginSpec {
            url: "{origin}/login.php",
            auth_cookie: None,
            auth_qs_param: Some("sid"),
            form,
            login_token: None,
        };
        let session = AuthSession::new(spec, credentials());

        session.login(&core(), &format!("{}/topic", base)).await.unwrap();

        assert_eq!(session.state(), AuthState::Authenticated);
        assert_eq!(session.request_auth().query.as_deref(), Some("sid=abc123"));
        assert_eq!(session.settings().query_string.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_rejected_login_is_authentication_error() {
        let hits = Hits::default();
        let counter = hits.clone();
        let base = serve(Router::new().route(
            "/login.php",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.inc();
                    "wrong password"
                }
            }),
        ))
        .await;
        let spec = LoginSpec {
            url: "{origin}/login.php",
            auth_cookie: Some("bb_session"),
            auth_qs_param: None,
            form,
            login_token: None,
        };
        let session = AuthSession::new(spec, credentials());

        let err = session.login(&core(), &format!("{}/topic", base)).await;

        assert!(matches!(err, Err(TrackerError::Authentication(_))));
        assert_eq!(session.state(), AuthState::Anonymous);
        assert_eq!(hits.get(), 1);
        assert!(session.take_update().is_none());
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let spec = LoginSpec {
            url: "{origin}/login.php",
            auth_cookie: Some("bb_session"),
            auth_qs_param: None,
            form,
            login_token: None,
        };
        let session = AuthSession::new(spec, AuthSettings::default());
        let err = session.login(&core(), "http://127.0.0.1:9/topic").await;
        assert!(matches!(err, Err(TrackerError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_login_token_is_scraped_first() {
        async fn login_page() -> impl IntoResponse {
            (
                [("set-cookie", "guest=g1; Path=/")],
                r#"<form><input type="hidden" name="sid" value="t0k3n"></form>"#,
            )
        }

        async fn check_login(
            Query(query): Query<BTreeMap<String, String>>,
            headers: HeaderMap,
            Form(fields): Form<BTreeMap<String, String>>,
        ) -> impl IntoResponse {
            let cookie = headers
                .get("cookie")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if query.get("sid").map(String::as_str) == Some("t0k3n")
                && fields.get("sid").map(String::as_str) == Some("t0k3n")
                && cookie.contains("guest=g1")
            {
                ([("set-cookie", "bb_session=s3ss; Path=/")], "welcome").into_response()
            } else {
                "login form again".into_response()
            }
        }

        let base = serve(Router::new().route("/ucp.php", get(login_page).post(check_login))).await;
        let spec = LoginSpec {
            url: "{origin}/ucp.php?mode=login",
            auth_cookie: Some("bb_session"),
            auth_qs_param: None,
            form,
            login_token: Some("sid"),
        };
        let session = AuthSession::new(spec, credentials());

        session.login(&core(), &format!("{}/topic", base)).await.unwrap();

        assert_eq!(session.state(), AuthState::Authenticated);
        assert_eq!(
            session.request_auth().cookies.get("bb_session").map(String::as_str),
            Some("s3ss")
        );
    }

    #[tokio::test]
    async fn test_missing_login_token() {
        let base = serve(Router::new().route("/ucp.php", get(|| async { "<form></form>" }))).await;
        let spec = LoginSpec {
            url: "{origin}/ucp.php?mode=login",
            auth_cookie: Some("bb_session"),
            auth_qs_param: None,
            form,
            login_token: Some("sid"),
        };
        let session = AuthSession::new(spec, credentials());

        let err = session.login(&core(), &format!("{}/topic", base)).await;

        assert!(matches!(err, Err(TrackerError::Authentication(_))));
        assert_eq!(session.state(), AuthState::Anonymous);
    }
}
