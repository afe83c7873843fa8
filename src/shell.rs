//! Usage: Tauri shell integration (`graph://` scheme interception, auth commands, browser sign-in).
//!
//! Pages call `fetch("graph://localhost/v1.0/me")`; the scheme handler maps the request
//! onto the configured API endpoint and runs it through the interceptor, which adds the
//! bearer token. Hosts finish the builder with their own context:
//! `webview_native_auth_lib::shell::builder(settings).run(tauri::generate_context!())`.

use crate::auth::bridge::{AuthBridge, AuthStateView};
use crate::auth::identity::OAuthIdentityProvider;
use crate::auth::provider::{AuthProvider, InteractiveContext, SignInPrompt, TokenSupplier};
use crate::infra::settings::AdapterSettings;
use crate::intercept::dispatcher::UiQueue;
use crate::intercept::filter::ResourceContext;
use crate::intercept::forwarder::{HttpForwarder, ReqwestForwarder};
use crate::intercept::interceptor::{Interception, Interceptor};
use crate::intercept::request::WebResourceRequest;
use crate::intercept::response::WebResourceResponse;
use crate::intercept::scheme;
use crate::shared::error::{AppError, AppResult};
use futures_core::future::BoxFuture;
use std::io::Read;
use std::sync::Arc;
use tauri::http::{Request, Response};
use tauri::Manager;
use tauri_plugin_opener::OpenerExt;

pub const GRAPH_SCHEME: &str = "graph";
const UI_QUEUE_THREAD: &str = "webview-auth-ui";

/// Opens the authorization page in the system browser.
struct OpenerPrompt {
    app: tauri::AppHandle,
}

impl SignInPrompt for OpenerPrompt {
    fn present<'a>(&'a self, authorize_url: &'a reqwest::Url) -> BoxFuture<'a, AppResult<()>> {
        Box::pin(async move {
            self.app
                .opener()
                .open_url(authorize_url.as_str(), None::<&str>)
                .map_err(|e| AppError::from(format!("SYSTEM_ERROR: failed to open browser: {e}")))
        })
    }
}

pub struct ShellServices {
    interceptor: Interceptor,
    bridge: AuthBridge,
    api_endpoint: String,
    _ui_queue: UiQueue,
}

impl ShellServices {
    fn new(app: &tauri::AppHandle, settings: &AdapterSettings) -> AppResult<Self> {
        let ui_queue = UiQueue::start(UI_QUEUE_THREAD)?;
        let provider = Arc::new(OAuthIdentityProvider::new(settings)?);
        let forwarder: Arc<dyn HttpForwarder> =
            Arc::new(ReqwestForwarder::new(&settings.user_agent)?);
        let interactive = InteractiveContext::new(Arc::new(OpenerPrompt { app: app.clone() }));

        let supplier: Arc<dyn TokenSupplier> = provider.clone();
        let interceptor = Interceptor::new(
            settings.request_filter()?,
            supplier,
            forwarder,
            Arc::new(ui_queue.handle()),
            interactive.clone(),
        );
        let auth_provider: Arc<dyn AuthProvider> = provider;
        let bridge = AuthBridge::new(auth_provider, interactive);

        Ok(Self {
            interceptor,
            bridge,
            api_endpoint: settings.api_endpoint.clone(),
            _ui_queue: ui_queue,
        })
    }
}

fn to_web_resource_request(
    request: Request<Vec<u8>>,
    api_endpoint: &str,
) -> AppResult<(WebResourceRequest, ResourceContext)> {
    let uri = scheme::rewrite_to_endpoint(&request.uri().to_string(), api_endpoint)?;
    let context = request
        .headers()
        .get("sec-fetch-dest")
        .and_then(|v| v.to_str().ok())
        .map(ResourceContext::from_fetch_dest)
        .unwrap_or(ResourceContext::Fetch);

    let mut out = WebResourceRequest::new(request.method().as_str(), uri);
    for (name, value) in request.headers() {
        if *name == tauri::http::header::HOST {
            continue;
        }
        match value.to_str() {
            Ok(value) => out = out.with_header(name.as_str(), value),
            Err(_) => tracing::debug!(header = %name, "dropping non-ascii header value"),
        }
    }
    let body = request.into_body();
    if !body.is_empty() {
        out = out.with_content(body);
    }
    Ok((out, context))
}

fn view_response(response: WebResourceResponse) -> Response<Vec<u8>> {
    let headers = scheme::view_headers(&response);
    let status = response.status();
    let mut body = Vec::with_capacity(response.content_len());
    if let Err(err) = response.into_content().read_to_end(&mut body) {
        return failure_response(&AppError::from(format!(
            "INTERCEPT_TRANSLATION: response body unreadable: {err}"
        )));
    }

    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    match builder.body(body) {
        Ok(response) => response,
        Err(err) => failure_response(&AppError::from(format!(
            "INTERCEPT_TRANSLATION: response rebuild failed: {err}"
        ))),
    }
}

fn failure_response(err: &AppError) -> Response<Vec<u8>> {
    let mut response = Response::new(scheme::failure_body(err));
    *response.status_mut() = tauri::http::StatusCode::from_u16(scheme::failure_status(err))
        .unwrap_or(tauri::http::StatusCode::BAD_GATEWAY);
    let headers = response.headers_mut();
    headers.insert(
        tauri::http::header::CONTENT_TYPE,
        tauri::http::HeaderValue::from_static("application/json"),
    );
    headers.insert(
        tauri::http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        tauri::http::HeaderValue::from_static("*"),
    );
    response
}

fn handle_scheme_request(
    app: &tauri::AppHandle,
    request: Request<Vec<u8>>,
    responder: tauri::UriSchemeResponder,
) {
    let Some(services) = app.try_state::<ShellServices>() else {
        responder.respond(failure_response(&AppError::from(
            "INTERCEPT_CANCELLED: shell services not ready".to_string(),
        )));
        return;
    };

    let (request, context) = match to_web_resource_request(request, &services.api_endpoint) {
        Ok(parts) => parts,
        Err(err) => {
            responder.respond(failure_response(&err));
            return;
        }
    };

    match services.interceptor.intercept(request, context) {
        Interception::Passthrough(request) => {
            tracing::debug!(uri = %request.uri, context = context.as_str(), "scheme request not intercepted");
            responder.respond(failure_response(&AppError::from(format!(
                "SEC_INVALID_INPUT: {} requests are not forwarded",
                context.as_str()
            ))));
        }
        Interception::Deferred(pending) => {
            tauri::async_runtime::spawn(async move {
                let response = match pending.await {
                    Ok(response) => view_response(response),
                    Err(err) => failure_response(&err),
                };
                responder.respond(response);
            });
        }
    }
}

#[tauri::command]
pub(crate) async fn auth_get_token(
    services: tauri::State<'_, ShellServices>,
) -> Result<String, String> {
    services.bridge.get_token().await.map_err(Into::into)
}

#[tauri::command]
pub(crate) async fn auth_sign_in(
    services: tauri::State<'_, ShellServices>,
) -> Result<AuthStateView, String> {
    services.bridge.sign_in().await.map_err(Into::into)
}

#[tauri::command]
pub(crate) async fn auth_sign_out(
    services: tauri::State<'_, ShellServices>,
) -> Result<AuthStateView, String> {
    services.bridge.sign_out().await.map_err(Into::into)
}

#[tauri::command]
pub(crate) async fn auth_try_silent_sign_in(
    services: tauri::State<'_, ShellServices>,
) -> Result<bool, String> {
    services.bridge.try_silent_sign_in().await.map_err(Into::into)
}

#[tauri::command]
pub(crate) fn auth_state(services: tauri::State<'_, ShellServices>) -> AuthStateView {
    services.bridge.state()
}

/// Builder with the `graph` scheme, the opener plugin and the auth commands wired in.
pub fn builder(settings: AdapterSettings) -> tauri::Builder<tauri::Wry> {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .register_asynchronous_uri_scheme_protocol(GRAPH_SCHEME, |ctx, request, responder| {
            handle_scheme_request(ctx.app_handle(), request, responder);
        })
        .invoke_handler(tauri::generate_handler![
            auth_get_token,
            auth_sign_in,
            auth_sign_out,
            auth_try_silent_sign_in,
            auth_state
        ])
        .setup(move |app| {
            let services = ShellServices::new(app.handle(), &settings)?;
            let bridge = services.bridge.clone();
            app.manage(services);

            tauri::async_runtime::spawn(async move {
                match bridge.try_silent_sign_in().await {
                    Ok(signed_in) => tracing::info!(signed_in, "startup silent sign-in finished"),
                    Err(err) => tracing::warn!("startup silent sign-in failed: {err}"),
                }
            });
            Ok(())
        })
}
