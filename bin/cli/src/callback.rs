//! Loopback listener for the identity provider's redirect.
//!
//! Routes:
//! - `/callback`: completes the login; a failure renders a page that
//!   returns to `/login` after a short delay
//! - `/login`: starts a new attempt and redirects to the provider
//! - `/` and the landing path: tells the user whether they can go back to
//!   the terminal, after capturing a transitional `jwt` parameter

use std::sync::Arc;
use std::time::Duration;

use askama::Template;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use budgetdesk_platform_access::gate::{DEFAULT_LANDING_PATH, DEFAULT_LOGIN_PATH};
use budgetdesk_platform_access::oidc::CALLBACK_PATH;
use budgetdesk_platform_access::{
    CallbackParams, FlowFailure, LoginFlow, LoginState, SessionError, SessionManager,
};
use rootcause::prelude::Report;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::CliError;

/// Shared state of the callback listener.
pub struct CallbackState {
    manager: Arc<SessionManager>,
    flow: Mutex<LoginFlow>,
    login_path: String,
    landing_path: String,
    completed: mpsc::Sender<()>,
}

impl CallbackState {
    /// Wraps a started login flow. `completed` receives one message when a
    /// callback authenticates the user.
    #[must_use]
    pub fn new(flow: LoginFlow, landing_path: &str, completed: mpsc::Sender<()>) -> Self {
        Self {
            manager: Arc::clone(flow.manager()),
            flow: Mutex::new(flow),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            landing_path: landing_path.to_string(),
            completed,
        }
    }
}

/// Query string of the provider's redirect.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl From<CallbackQuery> for CallbackParams {
    fn from(query: CallbackQuery) -> Self {
        Self {
            code: query.code,
            state: query.state,
            error: query.error,
            error_description: query.error_description,
        }
    }
}

#[derive(Template)]
#[template(path = "signed_in.html")]
struct SignedInPage<'a> {
    title: &'a str,
    landing_path: &'a str,
}

#[derive(Template)]
#[template(path = "signed_out.html")]
struct SignedOutPage<'a> {
    title: &'a str,
    login_path: &'a str,
}

/// Blocking error page that returns to login after a delay.
#[derive(Template)]
#[template(path = "login_failed.html")]
pub struct LoginFailedPage<'a> {
    title: &'a str,
    message: &'a str,
    redirect_to: &'a str,
    seconds: u64,
}

impl<'a> LoginFailedPage<'a> {
    #[must_use]
    pub fn new(failure: &'a FlowFailure) -> Self {
        Self {
            title: "Sign-in failed",
            message: &failure.message,
            redirect_to: &failure.redirect_to,
            seconds: failure.redirect_after.as_secs(),
        }
    }
}

/// Builds the listener's router.
pub fn router(state: Arc<CallbackState>) -> Router {
    let mut router = Router::new()
        .route(CALLBACK_PATH, get(callback))
        .route(DEFAULT_LOGIN_PATH, get(login))
        .route(DEFAULT_LANDING_PATH, get(landing));

    let landing_path = state.landing_path.as_str();
    if landing_path.starts_with('/')
        && ![DEFAULT_LANDING_PATH, DEFAULT_LOGIN_PATH, CALLBACK_PATH].contains(&landing_path)
    {
        router = router.route(landing_path, get(landing));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Serves the callback routes on `listener` until a login completes.
///
/// # Errors
///
/// Returns `CallbackTimeout` if nothing completes within `timeout`, or
/// `Listener` if serving fails.
pub async fn serve_until_complete(
    listener: TcpListener,
    state: Arc<CallbackState>,
    mut completed: mpsc::Receiver<()>,
    timeout: Duration,
) -> Result<(), Report<CliError>> {
    let app = router(state);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = completed.recv().await;
        info!("login completed, stopping callback listener");
    });

    match tokio::time::timeout(timeout, server).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CliError::Listener {
            details: e.to_string(),
        }
        .into()),
        Err(_) => Err(CliError::CallbackTimeout {
            seconds: timeout.as_secs(),
        }
        .into()),
    }
}

async fn callback(
    State(state): State<Arc<CallbackState>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let params = CallbackParams::from(query);
    let result = state.flow.lock().await.handle_callback(&params).await;

    match result {
        Ok(_) => {
            let _ = state.completed.try_send(());
            signed_in(&state)
        }
        Err(report) => {
            warn!(error = %report.current_context(), "login callback failed");
            failure_response(report.current_context(), &state.login_path)
        }
    }
}

async fn login(State(state): State<Arc<CallbackState>>) -> Response {
    let mut flow = state.flow.lock().await;
    if *flow.state() == LoginState::Authenticated {
        return Redirect::to(&state.landing_path).into_response();
    }

    match flow.start().await {
        Ok(url) => Redirect::to(url.as_str()).into_response(),
        Err(report) => {
            warn!(error = %report.current_context(), "could not restart login");
            failure_response(report.current_context(), &state.login_path)
        }
    }
}

async fn landing(State(state): State<Arc<CallbackState>>, uri: Uri) -> Response {
    if let Some(target) = capture_transitional_jwt(&state.manager, &uri) {
        return Redirect::to(&target).into_response();
    }

    if *state.flow.lock().await.state() == LoginState::Authenticated {
        signed_in(&state)
    } else {
        render(
            StatusCode::OK,
            &SignedOutPage {
                title: "Not signed in",
                login_path: &state.login_path,
            },
        )
    }
}

/// Stores a `jwt` query parameter and returns the request target without it,
/// or `None` when the request carries no such parameter.
fn capture_transitional_jwt(manager: &SessionManager, uri: &Uri) -> Option<String> {
    let target = uri.path_and_query().filter(|target| target.query().is_some())?;
    let target = target.as_str();
    let url = manager.origin().join(target).ok()?;

    let stripped = manager.capture_transitional_jwt(&url);
    if stripped == url {
        return None;
    }
    Some(match stripped.query() {
        Some(query) => format!("{}?{query}", stripped.path()),
        None => stripped.path().to_string(),
    })
}

fn signed_in(state: &CallbackState) -> Response {
    render(
        StatusCode::OK,
        &SignedInPage {
            title: "Signed in",
            landing_path: &state.landing_path,
        },
    )
}

fn failure_response(error: &SessionError, login_path: &str) -> Response {
    let failure = FlowFailure::from_error(error, login_path);
    render(status_for(error), &LoginFailedPage::new(&failure))
}

fn status_for(error: &SessionError) -> StatusCode {
    match error {
        SessionError::NetworkUnavailable { .. } | SessionError::ConfigFetchFailed { .. } => {
            StatusCode::BAD_GATEWAY
        }
        SessionError::RandomSourceFailed { .. }
        | SessionError::InvalidConfiguration { .. }
        | SessionError::InvalidVerifierLength { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn render(status: StatusCode, page: &impl Template) -> Response {
    match page.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to render page");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
