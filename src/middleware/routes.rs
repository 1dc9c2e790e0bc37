use std::any::Any;

use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use tower_http::catch_panic::CatchPanicLayer;

use super::state::RequestGate;
use super::traits::{AuthService, CredentialSigner, PrimaryVerifier};
use super::types::{Decision, LoginRoute};

/// Put every route of `router` behind the gate.
///
/// Routes added to the returned router afterwards are not gated. A panic
/// anywhere in the gated stack is turned into a redirect to the login route.
pub fn protect<S, P, A>(router: Router, gate: RequestGate<S, P, A>) -> Router
where
    S: CredentialSigner,
    P: PrimaryVerifier,
    A: AuthService,
{
    let login_path = gate.settings.login_path.clone();

    router
        .layer(middleware::from_fn_with_state(gate, gate_request::<S, P, A>))
        .layer(CatchPanicLayer::custom(
            move |_panic: Box<dyn Any + Send + 'static>| panic_redirect(&login_path),
        ))
}

/// Axum middleware running [`RequestGate::evaluate`] for one request.
///
/// Use directly with `axum::middleware::from_fn_with_state` when [`protect`]
/// does not fit the router layout.
pub async fn gate_request<S, P, A>(
    State(gate): State<RequestGate<S, P, A>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response
where
    S: CredentialSigner,
    P: PrimaryVerifier,
    A: AuthService,
{
    let outcome = gate.evaluate(request.uri(), &jar).await;

    let jar = match outcome.cookie {
        Some(cookie) => jar.add(cookie),
        None => jar,
    };

    match outcome.decision {
        Decision::Redirect(target) => (jar, Redirect::to(&target)).into_response(),
        Decision::Proceed(identity) | Decision::PassThrough(identity) => {
            request.extensions_mut().insert(identity);
            request
                .extensions_mut()
                .insert(LoginRoute(gate.settings.login_path.clone()));
            let response = next.run(request).await;
            (jar, response).into_response()
        }
    }
}

fn panic_redirect(login_path: &str) -> Response {
    tracing::error!("Panic while handling a gated request");
    Redirect::to(login_path).into_response()
}
