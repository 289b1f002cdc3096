use std::mem;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::{broadcast, oneshot};

use crate::error::ApiError;
use crate::tokens::{TokenPair, TokenStore};
use crate::transport::{HttpRequest, HttpResponse, Transport};

pub const LOGIN_PATH: &str = "token/";
pub const REFRESH_PATH: &str = "token/refresh/";

/// Raised once per unrecoverable loss of the stored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthLost;

type Waiter = oneshot::Sender<Result<String, ApiError>>;

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: Vec<Waiter>,
}

enum Flight {
    Lead,
    Wait(oneshot::Receiver<Result<String, ApiError>>),
}

/// Clears the in-flight flag when the refreshing future finishes or is
/// dropped. Waiters left behind by a drop see their sender vanish and fail
/// with `RefreshAbandoned`.
struct FlightGuard<'a> {
    state: &'a Mutex<RefreshState>,
    armed: bool,
}

impl FlightGuard<'_> {
    fn finish(mut self) -> Vec<Waiter> {
        self.armed = false;
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.in_flight = false;
        mem::take(&mut state.waiters)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            state.in_flight = false;
            state.waiters.clear();
        }
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh: &'a str,
}

/// Owns the token pair and the transport; every backend call that needs
/// credentials goes through [`Session::authorized_request`].
pub struct Session<T: Transport, S: TokenStore> {
    transport: T,
    store: S,
    refresh: Mutex<RefreshState>,
    auth_lost: broadcast::Sender<AuthLost>,
}

impl<T: Transport, S: TokenStore> Session<T, S> {
    pub fn new(transport: T, store: S) -> Self {
        let (auth_lost, _receiver) = broadcast::channel(4);
        Self {
            transport,
            store,
            refresh: Mutex::new(RefreshState::default()),
            auth_lost,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Listen for authentication loss. Each loss is delivered once.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthLost> {
        self.auth_lost.subscribe()
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.access_token()
    }

    pub fn is_logged_in(&self) -> bool {
        self.store.load().is_some()
    }

    /// Exchange credentials for a token pair. A failed login leaves the
    /// stored state untouched.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let body = serde_json::to_value(Credentials { username, password })?;
        let response = self.transport.send(HttpRequest::post(LOGIN_PATH, body)).await?;
        if matches!(response.status, 400 | 401) {
            let detail = detail_of(&response.body);
            log::info!("login for {username} rejected: {detail}");
            return Err(ApiError::CredentialsRejected(detail));
        }
        let tokens = decode_tokens(&response)?;
        self.store.save(&tokens)?;
        log::info!("logged in as {username}");
        Ok(tokens)
    }

    /// Forget both tokens. Navigation is up to the caller.
    pub fn logout(&self) {
        if let Err(e) = self.store.clear() {
            log::error!("failed to clear tokens: {e}");
        }
        log::info!("logged out");
    }

    /// Send `request` with the current access token attached, recovering
    /// once from an expired access token via the refresh token.
    pub async fn authorized_request(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let response = self
            .transport
            .send(request.clone().with_bearer(self.access_token()))
            .await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        let Some(refresh) = self.store.refresh_token() else {
            log::warn!("{} {} unauthorized and no refresh token stored", request.method, request.path);
            self.drop_session();
            return Err(ApiError::Unauthorized);
        };

        let access = self.refreshed_access_token(&refresh).await?;
        let retried = self
            .transport
            .send(request.clone().with_bearer(Some(access)))
            .await?;
        if retried.is_unauthorized() {
            log::warn!("{} {} still unauthorized after refresh", request.method, request.path);
            self.drop_session();
            return Err(ApiError::Unauthorized);
        }
        Ok(retried)
    }

    /// Either performs the refresh exchange or, if one is already running,
    /// waits for its outcome.
    async fn refreshed_access_token(&self, refresh: &str) -> Result<String, ApiError> {
        let flight = {
            let mut state = self.refresh.lock().unwrap_or_else(|p| p.into_inner());
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Flight::Wait(rx)
            } else {
                state.in_flight = true;
                Flight::Lead
            }
        };

        match flight {
            Flight::Wait(rx) => {
                log::debug!("refresh already in flight, queued");
                rx.await.unwrap_or(Err(ApiError::RefreshAbandoned))
            }
            Flight::Lead => {
                let guard = FlightGuard {
                    state: &self.refresh,
                    armed: true,
                };
                // The old refresh token is spent once the exchange succeeds, so
                // a pair that cannot be stored ends the session as well.
                let outcome = match self.exchange_refresh(refresh).await {
                    Ok(tokens) => self.store.save(&tokens).map(|()| tokens).map_err(|e| {
                        log::error!("failed to persist refreshed tokens: {e}");
                        ApiError::Storage(e.to_string())
                    }),
                    Err(e) => Err(e),
                };
                match &outcome {
                    Ok(_) => log::info!("access token refreshed"),
                    Err(e) => {
                        log::warn!("token refresh failed: {e}");
                        self.drop_session();
                    }
                }
                let access = outcome.map(|t| t.access);
                for waiter in guard.finish() {
                    let _ = waiter.send(access.clone());
                }
                access
            }
        }
    }

    async fn exchange_refresh(&self, refresh: &str) -> Result<TokenPair, ApiError> {
        let body = serde_json::to_value(RefreshBody { refresh })?;
        let response = self
            .transport
            .send(HttpRequest::post(REFRESH_PATH, body))
            .await
            .map_err(|e| ApiError::RefreshFailed(e.to_string()))?;
        if !response.is_success() {
            return Err(ApiError::RefreshFailed(format!(
                "status {}: {}",
                response.status,
                detail_of(&response.body)
            )));
        }
        decode_tokens(&response).map_err(|e| ApiError::RefreshFailed(e.to_string()))
    }

    fn drop_session(&self) {
        if let Err(e) = self.store.clear() {
            log::error!("failed to clear tokens: {e}");
        }
        // No receivers is fine; nobody is listening.
        let _ = self.auth_lost.send(AuthLost);
    }
}

fn decode_tokens(response: &HttpResponse) -> Result<TokenPair, ApiError> {
    if !response.is_success() {
        return Err(ApiError::Status {
            status: response.status,
            body: response.body.clone(),
        });
    }
    Ok(serde_json::from_str(&response.body)?)
}

/// DRF puts the human readable reason under `detail`.
fn detail_of(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::MemoryTokenStore;
    use crate::transport::MockTransport;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn login_backend() -> MockTransport {
        MockTransport::new(|req| {
            let body = req.body.clone().unwrap_or_default();
            if req.path == LOGIN_PATH && body["password"] == "secret" {
                Ok(HttpResponse::json(200, json!({"access": "a1", "refresh": "r1"})))
            } else {
                Ok(HttpResponse::json(
                    401,
                    json!({"detail": "No active account found with the given credentials"}),
                ))
            }
        })
    }

    #[tokio::test]
    async fn login_stores_tokens() {
        let session = Session::new(login_backend(), MemoryTokenStore::new());
        let tokens = session.login("admin", "secret").await.unwrap();
        assert_eq!(tokens.access, "a1");
        assert_eq!(session.access_token().as_deref(), Some("a1"));
        assert!(session.is_logged_in());
    }

    #[tokio::test]
    async fn failed_login_keeps_existing_state() {
        let session = Session::new(login_backend(), MemoryTokenStore::with_tokens("old", "oldr"));
        let err = session.login("admin", "wrong").await.unwrap_err();
        assert_matches!(err, ApiError::CredentialsRejected(msg) if msg.contains("No active account"));
        assert_eq!(session.access_token().as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn login_network_error_propagates() {
        let transport = MockTransport::new(|_| Err(ApiError::Transport("connection refused".into())));
        let session = Session::new(transport, MemoryTokenStore::new());
        assert_matches!(
            session.login("admin", "secret").await,
            Err(ApiError::Transport(_))
        );
        assert!(!session.is_logged_in());
    }

    #[tokio::test]
    async fn logout_clears_tokens_without_signal() {
        let session = Session::new(login_backend(), MemoryTokenStore::with_tokens("a", "r"));
        let mut rx = session.subscribe();
        session.logout();
        assert_eq!(session.access_token(), None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn bearer_header_uses_stored_token() {
        let transport = MockTransport::new(|_| Ok(HttpResponse::new(200, "[]")));
        let session = Session::new(transport.clone(), MemoryTokenStore::with_tokens("a1", "r1"));
        session.authorized_request(HttpRequest::get("teams/")).await.unwrap();
        assert_eq!(transport.requests()[0].bearer.as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn anonymous_request_has_no_bearer() {
        let transport = MockTransport::new(|_| Ok(HttpResponse::new(200, "[]")));
        let session = Session::new(transport.clone(), MemoryTokenStore::new());
        session.authorized_request(HttpRequest::get("racers/")).await.unwrap();
        assert_eq!(transport.requests()[0].bearer, None);
    }

    #[tokio::test]
    async fn unauthorized_without_refresh_token_clears_and_signals() {
        let transport = MockTransport::new(|_| Ok(HttpResponse::new(401, "{}")));
        let session = Session::new(transport.clone(), MemoryTokenStore::new());
        let mut rx = session.subscribe();
        let err = session.authorized_request(HttpRequest::get("teams/")).await.unwrap_err();
        assert_eq!(err, ApiError::Unauthorized);
        assert_eq!(rx.try_recv().unwrap(), AuthLost);
        assert_eq!(transport.count(REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn other_errors_pass_through_untouched() {
        let transport = MockTransport::new(|_| Ok(HttpResponse::new(500, "boom")));
        let session = Session::new(transport.clone(), MemoryTokenStore::with_tokens("a", "r"));
        let resp = session.authorized_request(HttpRequest::get("teams/")).await.unwrap();
        assert_eq!(resp.status, 500);
        assert_eq!(transport.count(REFRESH_PATH), 0);
        assert!(session.is_logged_in());
    }

    /// Holds a pair but refuses to write a new one.
    struct ReadOnlyStore(std::sync::Mutex<Option<TokenPair>>);

    impl TokenStore for ReadOnlyStore {
        fn load(&self) -> Option<TokenPair> {
            self.0.lock().unwrap().clone()
        }

        fn save(&self, _: &TokenPair) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"))
        }

        fn clear(&self) -> std::io::Result<()> {
            *self.0.lock().unwrap() = None;
            Ok(())
        }
    }

    #[tokio::test]
    async fn unsaved_refresh_ends_the_session() {
        let transport = MockTransport::new(|req| {
            Ok(match (req.path.as_str(), req.bearer.as_deref()) {
                (REFRESH_PATH, _) => HttpResponse::json(200, json!({"access": "new", "refresh": "r2"})),
                (_, Some("new")) => HttpResponse::new(200, "[]"),
                _ => HttpResponse::new(401, "{}"),
            })
        });
        let store = ReadOnlyStore(std::sync::Mutex::new(Some(TokenPair {
            access: "old".into(),
            refresh: "r1".into(),
        })));
        let session = Session::new(transport.clone(), store);
        let mut rx = session.subscribe();

        let result = session.authorized_request(HttpRequest::get("teams/")).await;

        assert_matches!(result, Err(ApiError::Storage(_)));
        assert_eq!(session.access_token(), None);
        assert_eq!(rx.try_recv().unwrap(), AuthLost);
        assert!(rx.try_recv().is_err());
        // no retry with a token that was never stored
        assert_eq!(transport.count("teams/"), 1);
    }

    #[test]
    fn dropped_leader_releases_flag() {
        let session = Session::new(login_backend(), MemoryTokenStore::new());
        {
            let mut state = session.refresh.lock().unwrap();
            state.in_flight = true;
        }
        let (tx, mut rx) = oneshot::channel();
        session.refresh.lock().unwrap().waiters.push(tx);
        drop(FlightGuard {
            state: &session.refresh,
            armed: true,
        });
        let state = session.refresh.lock().unwrap();
        assert!(!state.in_flight);
        assert!(state.waiters.is_empty());
        assert!(rx.try_recv().is_err());
    }
}
