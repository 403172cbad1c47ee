use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::jwt::{LoginRequired, MaybeUser};
use crate::auth::repo::User;
use crate::error::{AppError, AppResult, OptionExt};
use crate::languages;
use crate::notify::SnippetCreated;
use crate::state::AppState;

use super::dto::{
    FieldErrors, LanguageOption, SnippetDetail, SnippetForm, SnippetListItem, SnippetPayload,
};
use super::policy::{is_owner, is_visible};
use super::repo::{self, NewSnippet, SnippetChanges};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/snippets/:id", get(snippet_detail))
        .route("/users/:username/snippets", get(snippets_by_user))
        .route("/languages/:slug/snippets", get(snippets_by_language))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/snippets", post(create_snippet))
        .route("/snippets/new", get(new_snippet))
        .route("/snippets/:id/edit", get(edit_snippet).post(update_snippet))
        .route("/snippets/:id/delete", post(delete_snippet))
}

/// Ids come in as path strings; anything that is not a UUID is treated the
/// same as an id that matches no snippet.
fn parse_snippet_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound("Snippet not found".to_string()))
}

async fn language_options(state: &AppState) -> AppResult<Vec<LanguageOption>> {
    let languages = languages::repo::all(&state.db).await?;
    Ok(languages.iter().map(LanguageOption::from).collect())
}

#[instrument(skip(state))]
async fn index(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
) -> AppResult<Json<Vec<SnippetListItem>>> {
    let snippets = repo::list_feed(&state.db, viewer).await?;
    Ok(Json(snippets.into_iter().map(SnippetListItem::from).collect()))
}

#[instrument(skip(state))]
async fn new_snippet(
    State(state): State<AppState>,
    LoginRequired(_): LoginRequired,
) -> AppResult<Json<SnippetForm>> {
    let form = SnippetForm::create(
        SnippetPayload::default(),
        FieldErrors::default(),
        language_options(&state).await?,
    );
    Ok(Json(form))
}

#[instrument(skip(state, payload))]
async fn create_snippet(
    State(state): State<AppState>,
    LoginRequired(user_id): LoginRequired,
    Json(payload): Json<SnippetPayload>,
) -> AppResult<Response> {
    let language = languages::repo::find_by_slug(&state.db, payload.language.trim()).await?;
    let valid = match payload.validate(language.as_ref()) {
        Ok(valid) => valid,
        Err(errors) => {
            let form = SnippetForm::create(payload, errors, language_options(&state).await?);
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(form)).into_response());
        }
    };

    let owner = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unknown user".to_string()))?;

    let name = valid.name.clone();
    let description = valid.description.clone();
    let id = repo::create(
        &state.db,
        &NewSnippet {
            owner_id: owner.id,
            language_id: valid.language.id,
            name: valid.name,
            description: valid.description,
            body: valid.body,
            public: valid.public,
        },
    )
    .await?;

    // The insert is already committed; delivery happens off the request path.
    state.notifications.enqueue(SnippetCreated {
        name,
        description,
        recipient: owner.email,
    });

    info!(snippet_id = %id, user_id = %user_id, "snippet created");
    Ok(Redirect::to(&format!("/snippets/{id}")).into_response())
}

#[instrument(skip(state))]
async fn snippet_detail(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = parse_snippet_id(&id)?;
    let snippet = repo::get(&state.db, id).await?.ok_or_not_found("Snippet")?;

    if !is_visible(viewer, &snippet) {
        warn!(snippet_id = %id, "hiding private snippet from non-owner");
        return Ok(Redirect::to("/").into_response());
    }

    let highlighted = state
        .highlighter
        .render(&snippet.body, &snippet.language.lexer);
    Ok(Json(SnippetDetail::new(snippet, highlighted)).into_response())
}

#[instrument(skip(state))]
async fn edit_snippet(
    State(state): State<AppState>,
    LoginRequired(user_id): LoginRequired,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = parse_snippet_id(&id)?;
    let snippet = repo::get(&state.db, id).await?.ok_or_not_found("Snippet")?;

    if !is_owner(Some(user_id), &snippet) {
        warn!(snippet_id = %id, user_id = %user_id, "denied edit form for foreign snippet");
        return Ok(Redirect::to("/").into_response());
    }

    let form = SnippetForm::edit(
        SnippetPayload::from(&snippet),
        FieldErrors::default(),
        language_options(&state).await?,
    );
    Ok(Json(form).into_response())
}

#[instrument(skip(state, payload))]
async fn update_snippet(
    State(state): State<AppState>,
    LoginRequired(user_id): LoginRequired,
    Path(id): Path<String>,
    Json(payload): Json<SnippetPayload>,
) -> AppResult<Response> {
    let id = parse_snippet_id(&id)?;
    let snippet = repo::get(&state.db, id).await?.ok_or_not_found("Snippet")?;

    if !is_owner(Some(user_id), &snippet) {
        warn!(snippet_id = %id, user_id = %user_id, "denied edit of foreign snippet");
        return Ok(Redirect::to("/").into_response());
    }

    let language = languages::repo::find_by_slug(&state.db, payload.language.trim()).await?;
    let valid = match payload.validate(language.as_ref()) {
        Ok(valid) => valid,
        Err(errors) => {
            let form = SnippetForm::edit(payload, errors, language_options(&state).await?);
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(form)).into_response());
        }
    };

    repo::update(
        &state.db,
        id,
        &SnippetChanges {
            language_id: valid.language.id,
            name: valid.name,
            description: valid.description,
            body: valid.body,
            public: valid.public,
        },
    )
    .await?;

    info!(snippet_id = %id, user_id = %user_id, "snippet updated");
    Ok(Redirect::to(&format!("/snippets/{id}")).into_response())
}

#[instrument(skip(state))]
async fn delete_snippet(
    State(state): State<AppState>,
    LoginRequired(user_id): LoginRequired,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = parse_snippet_id(&id)?;
    let snippet = repo::get(&state.db, id).await?.ok_or_not_found("Snippet")?;

    if !is_owner(Some(user_id), &snippet) {
        warn!(snippet_id = %id, user_id = %user_id, "denied delete of foreign snippet");
        return Ok(Redirect::to("/").into_response());
    }

    repo::delete(&state.db, id).await?;
    info!(snippet_id = %id, user_id = %user_id, "snippet deleted");
    Ok(Redirect::to(&format!("/users/{}/snippets", snippet.owner.username)).into_response())
}

#[instrument(skip(state))]
async fn snippets_by_user(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(username): Path<String>,
) -> AppResult<Json<Vec<SnippetListItem>>> {
    let owner = User::find_by_username(&state.db, &username)
        .await?
        .ok_or_not_found("User")?;
    let include_private = viewer == Some(owner.id);
    let snippets = repo::list_by_owner(&state.db, owner.id, include_private).await?;
    Ok(Json(snippets.into_iter().map(SnippetListItem::from).collect()))
}

#[instrument(skip(state))]
async fn snippets_by_language(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<Vec<SnippetListItem>>> {
    let language = languages::repo::find_by_slug(&state.db, &slug)
        .await?
        .ok_or_not_found("Language")?;
    let snippets = repo::list_public_by_language(&state.db, language.id).await?;
    Ok(Json(snippets.into_iter().map(SnippetListItem::from).collect()))
}
