//! HTTP handlers for the per-kind CRUD routes and the site pages

use super::gate::permission_gate;
use super::notices::Notice;
use super::render;
use super::responder::{
    hx_redirect, redirect, Mutation, Responder, CREATED_NOTICE, DELETED_NOTICE, UPDATED_NOTICE,
};
use super::server::AppState;
use super::session::SessionId;
use crate::crud::{Caller, CrudController, FormPage, RouteAction};
use crate::error::{LearouError, Result};
use crate::types::RecordId;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::Response,
    routing::{get, MethodRouter},
    Extension, Form, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

type Controller = Extension<Arc<CrudController>>;
type FormPairs = Form<Vec<(String, String)>>;

fn action_routes(action: RouteAction) -> MethodRouter<AppState> {
    match action {
        RouteAction::List => get(list_handler),
        RouteAction::Detail => get(detail_handler),
        RouteAction::Create => get(create_form_handler).post(create_handler),
        RouteAction::Update => get(update_form_handler).post(update_handler),
        RouteAction::Delete => get(confirm_delete_handler).post(delete_handler),
    }
}

/// The five routes of one kind, with the gate in front of the mutating ones
pub fn kind_router(state: &AppState, controller: Arc<CrudController>) -> Router<AppState> {
    let routes = controller.routes().clone();

    let (read, write) = RouteAction::ALL.into_iter().fold(
        (Router::new(), Router::new()),
        |(read, write), action| {
            let pattern = routes.pattern(action);
            if action.is_mutation() {
                (read, write.route(&pattern, action_routes(action)))
            } else {
                (read.route(&pattern, action_routes(action)), write)
            }
        },
    );

    let write = write.route_layer(middleware::from_fn_with_state(
        state.clone(),
        permission_gate,
    ));

    read.merge(write).layer(Extension(controller))
}

fn parse_id(controller: &CrudController, raw: &str) -> Result<RecordId> {
    RecordId::parse(raw).ok_or_else(|| LearouError::not_found(controller.kind().display_name, raw))
}

/// Render `template` for a successful read, or the error page
async fn read_page<T: Serialize>(
    responder: &Responder<'_>,
    template: &str,
    result: Result<T>,
) -> Response {
    match result {
        Ok(page) => responder.page(StatusCode::OK, template, page).await,
        Err(err) => responder.error_page(&err).await,
    }
}

pub async fn list_handler(
    State(state): State<AppState>,
    Extension(controller): Controller,
    Extension(session): Extension<SessionId>,
    headers: HeaderMap,
) -> Response {
    let responder = Responder::new(&state, &headers, &session);
    read_page(&responder, render::LIST, controller.list().await).await
}

pub async fn detail_handler(
    State(state): State<AppState>,
    Extension(controller): Controller,
    Extension(session): Extension<SessionId>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let responder = Responder::new(&state, &headers, &session);
    let template = if responder.mode().is_fragment() {
        render::FIELDS_FRAGMENT
    } else {
        render::DETAIL
    };
    let page = match parse_id(&controller, &id) {
        Ok(id) => controller.detail(id).await,
        Err(err) => Err(err),
    };
    read_page(&responder, template, page).await
}

fn form_template(responder: &Responder<'_>) -> &'static str {
    if responder.mode().is_fragment() {
        render::FORM_FRAGMENT
    } else {
        render::FORM
    }
}

pub async fn create_form_handler(
    State(state): State<AppState>,
    Extension(controller): Controller,
    Extension(session): Extension<SessionId>,
    headers: HeaderMap,
) -> Response {
    let responder = Responder::new(&state, &headers, &session);
    read_page(&responder, form_template(&responder), controller.form(None).await).await
}

pub async fn update_form_handler(
    State(state): State<AppState>,
    Extension(controller): Controller,
    Extension(session): Extension<SessionId>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let responder = Responder::new(&state, &headers, &session);
    let page = match parse_id(&controller, &id) {
        Ok(id) => controller.form(Some(id)).await,
        Err(err) => Err(err),
    };
    read_page(&responder, form_template(&responder), page).await
}

pub async fn confirm_delete_handler(
    State(state): State<AppState>,
    Extension(controller): Controller,
    Extension(session): Extension<SessionId>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let responder = Responder::new(&state, &headers, &session);
    let template = if responder.mode().is_fragment() {
        render::DELETE_FRAGMENT
    } else {
        render::DETAIL
    };
    let page = match parse_id(&controller, &id) {
        Ok(id) => controller.confirm_delete(id).await,
        Err(err) => Err(err),
    };
    read_page(&responder, template, page).await
}

#[derive(Serialize)]
struct InvalidForm {
    #[serde(flatten)]
    form: FormPage,
    errors: crate::error::ValidationErrors,
}

/// Full-page mutation failure
///
/// Validation failures re-render the form with the submitted values and the
/// field errors; other failures get the error page.
async fn full_page_failure(
    responder: &Responder<'_>,
    controller: &CrudController,
    id: Option<RecordId>,
    submitted: &[(String, String)],
    err: LearouError,
) -> Response {
    let LearouError::Validation(errors) = err else {
        return responder.error_page(&err).await;
    };

    let mut form = match controller.form(id).await {
        Ok(form) => form,
        Err(err) => return responder.error_page(&err).await,
    };
    for field in &mut form.fields {
        field.values = submitted
            .iter()
            .filter(|(key, _)| key == field.name)
            .map(|(_, value)| value.clone())
            .collect();
    }

    responder
        .page(
            StatusCode::UNPROCESSABLE_ENTITY,
            render::FORM,
            InvalidForm { form, errors },
        )
        .await
}

pub async fn create_handler(
    State(state): State<AppState>,
    Extension(controller): Controller,
    Extension(session): Extension<SessionId>,
    Extension(caller): Extension<Caller>,
    headers: HeaderMap,
    Form(form): FormPairs,
) -> Response {
    let responder = Responder::new(&state, &headers, &session);
    let routes = controller.routes();

    match controller.create(&caller, &form).await {
        Ok(record) => {
            let detail = routes.detail(record.id);
            if responder.mode().is_fragment() {
                responder.notify(Notice::success(CREATED_NOTICE)).await;
                hx_redirect(&detail, None)
            } else {
                redirect(&detail)
            }
        }
        Err(err) if responder.mode().is_fragment() => {
            responder
                .fragment_failure(&err, Mutation::Create, &headers, &routes.list())
                .await
        }
        Err(err) => full_page_failure(&responder, &controller, None, &form, err).await,
    }
}

pub async fn update_handler(
    State(state): State<AppState>,
    Extension(controller): Controller,
    Extension(session): Extension<SessionId>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Form(form): FormPairs,
) -> Response {
    let responder = Responder::new(&state, &headers, &session);
    let routes = controller.routes();

    let result = match parse_id(&controller, &id) {
        Ok(id) => controller.update(&caller, id, &form).await.map(|r| (id, r)),
        Err(err) => Err(err),
    };

    match result {
        Ok((id, _)) if responder.mode().is_fragment() => {
            responder.notify(Notice::success(UPDATED_NOTICE)).await;
            debug!("Rendering updated fields of {} {}", controller.kind().slug, id);
            read_page(&responder, render::FIELDS_FRAGMENT, controller.detail(id).await).await
        }
        Ok((id, _)) => redirect(&routes.detail(id)),
        Err(err) if responder.mode().is_fragment() => {
            responder
                .fragment_failure(&err, Mutation::Update, &headers, &routes.list())
                .await
        }
        Err(err) => {
            let id = RecordId::parse(&id);
            full_page_failure(&responder, &controller, id, &form, err).await
        }
    }
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Extension(controller): Controller,
    Extension(session): Extension<SessionId>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let responder = Responder::new(&state, &headers, &session);
    let list = controller.routes().list();

    let result = match parse_id(&controller, &id) {
        Ok(id) => controller.delete(&caller, id).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(()) if responder.mode().is_fragment() => {
            responder.notify(Notice::success(DELETED_NOTICE)).await;
            hx_redirect(&list, None)
        }
        Ok(()) => redirect(&list),
        Err(err) if responder.mode().is_fragment() => {
            responder
                .fragment_failure(&err, Mutation::Delete, &headers, &list)
                .await
        }
        Err(err) => responder.error_page(&err).await,
    }
}

#[derive(Serialize)]
struct KindLink {
    slug: &'static str,
    display_name: String,
    list_url: String,
}

async fn kind_links(state: &AppState) -> Result<Vec<KindLink>> {
    let mut links = Vec::with_capacity(state.controllers.len());
    for controller in state.controllers.iter() {
        links.push(KindLink {
            slug: controller.kind().slug,
            display_name: controller.display_name().await?,
            list_url: controller.routes().list(),
        });
    }
    Ok(links)
}

pub async fn home_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    headers: HeaderMap,
) -> Response {
    let responder = Responder::new(&state, &headers, &session);
    let caller = state.identity.caller(&headers);
    let page = kind_links(&state).await.map(|kinds| {
        json!({
            "kinds": kinds,
            "user": caller.username(),
        })
    });
    read_page(&responder, render::HOME, page).await
}

pub async fn features_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    headers: HeaderMap,
) -> Response {
    let responder = Responder::new(&state, &headers, &session);
    let features: Vec<_> = state
        .registry
        .kinds()
        .map(|kind| {
            json!({
                "slug": kind.slug,
                "display_name": kind.display_name,
                "fields": kind.fields.iter().map(|f| f.label).collect::<Vec<_>>(),
            })
        })
        .collect();
    responder
        .page(StatusCode::OK, render::FEATURES, json!({ "features": features }))
        .await
}
