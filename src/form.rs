//! Fake HTTP login form: a second producer on the event bus.
//!
//! Serves a single inline login page; every submitted credential pair is
//! recorded as a `form` event and answered with a generic failure. Unknown
//! paths redirect back to the form, keeping scanners on the page.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::response::{Html, Redirect};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bus;
use crate::errors::EngineError;
use crate::event::{Event, SERVICE_FORM};

#[derive(Clone)]
struct FormState {
    tx: mpsc::Sender<Event>,
}

#[derive(Debug, Deserialize)]
struct LoginAttempt {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Serve the login-form honeypot until the shutdown token is cancelled.
pub async fn serve(
    addr: String,
    tx: mpsc::Sender<Event>,
    shutdown: CancellationToken,
) -> Result<(), EngineError> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| EngineError::Bind { addr, source })?;
    info!(addr = %listener.local_addr()?, "login-form honeypot listening");

    let app = Router::new()
        .route("/", get(index))
        .route("/v/login", post(login))
        .fallback(|| async { Redirect::to("/") })
        .with_state(FormState { tx });

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    info!("login-form honeypot stopped");
    Ok(())
}

async fn index() -> Html<String> {
    page(None)
}

async fn login(
    State(state): State<FormState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Form(attempt): Form<LoginAttempt>,
) -> Html<String> {
    info!(remote = %peer, username = %attempt.username, "login form submission");

    bus::publish(
        &state.tx,
        Event::new(SERVICE_FORM)
            .with_remote(peer.ip().to_string())
            .with_auth(attempt.username, attempt.password),
    )
    .await;

    page(Some("Invalid username or password"))
}

fn page(error: Option<&str>) -> Html<String> {
    let notice = error
        .map(|msg| format!("<p class=\"error\">{msg}</p>"))
        .unwrap_or_default();

    Html(format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><title>Sign in</title></head>\n\
         <body>\n\
         <h1>Sign in</h1>\n\
         {notice}\n\
         <form method=\"post\" action=\"/v/login\">\n\
         <label>Username <input type=\"text\" name=\"username\"></label>\n\
         <label>Password <input type=\"password\" name=\"password\"></label>\n\
         <button type=\"submit\">Sign in</button>\n\
         </form>\n\
         </body>\n\
         </html>\n"
    ))
}
