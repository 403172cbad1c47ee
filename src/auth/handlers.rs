use axum::{
    extract::{FromRef, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginForm, LoginQuery, LoginRequest, LogoutRequest, PublicUser,
            RefreshRequest, RegisterRequest,
        },
        jwt::{AuthUser, JwtKeys},
        password::{hash_password, verify_password},
        repo::{Session, User},
    },
    error::{AppError, AppResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", get(login_form).post(login))
        .route("/logout", post(logout))
        .route("/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let username = payload.username.trim().to_string();
    if username.is_empty() {
        return Err(AppError::BadRequest("Username is required".into()));
    }
    if !is_valid_username(&username) {
        warn!(username = %username, "invalid username");
        return Err(AppError::BadRequest(
            "Username may only contain letters, digits and @/./+/-/_".into(),
        ));
    }

    let email = match payload.email.as_deref().map(|e| e.trim().to_lowercase()) {
        Some(e) if e.is_empty() => None,
        Some(e) => {
            if !is_valid_email(&e) {
                warn!(email = %e, "invalid email");
                return Err(AppError::BadRequest("Invalid email".into()));
            }
            Some(e)
        }
        None => None,
    };

    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(AppError::BadRequest("Password too short".into()));
    }

    if User::find_by_username(&state.db, &username).await?.is_some() {
        warn!(username = %username, "username already taken");
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, &username, email.as_deref(), &hash).await?;

    let keys = JwtKeys::from_ref(&state);
    let session = Session::create(&state.db, user.id, keys.refresh_ttl).await?;
    let access_token = keys.sign_access(user.id, session.id)?;
    let refresh_token = keys.sign_refresh(user.id, session.id)?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token,
            refresh_token,
            user: PublicUser::from(&user),
            redirect_to: None,
        }),
    ))
}

/// GET side of the login flow: the empty form view-model, echoing the
/// return path so the client can post it back.
#[instrument]
pub async fn login_form(Query(query): Query<LoginQuery>) -> Json<LoginForm> {
    Json(LoginForm {
        next: query.next,
        errors: Vec::new(),
    })
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Response> {
    let username = payload.username.trim();

    let user = match User::find_by_username(&state.db, username).await? {
        Some(u) => u,
        None => {
            warn!(username = %username, "login unknown username");
            return Ok(login_rejected(payload.next));
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Ok(login_rejected(payload.next));
    }

    let keys = JwtKeys::from_ref(&state);
    let session = Session::create(&state.db, user.id, keys.refresh_ttl).await?;
    let access_token = keys.sign_access(user.id, session.id)?;
    let refresh_token = keys.sign_refresh(user.id, session.id)?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser::from(&user),
        redirect_to: Some(sanitize_next(payload.next)),
    })
    .into_response())
}

/// Tears down the session when the refresh token resolves and redirects
/// home either way.
#[instrument(skip(state, payload))]
pub async fn logout(
    State(state): State<AppState>,
    payload: Option<Json<LogoutRequest>>,
) -> AppResult<Redirect> {
    if let Some(Json(LogoutRequest {
        refresh_token: Some(token),
    })) = payload
    {
        let keys = JwtKeys::from_ref(&state);
        if let Ok(claims) = keys.verify_refresh(&token) {
            if Session::delete(&state.db, claims.sid).await? {
                info!(user_id = %claims.sub, "session terminated");
            }
        }
    }
    Ok(Redirect::to("/"))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;

    let session = Session::find(&state.db, claims.sid)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Session expired".into()))?;
    if session.expires_at <= OffsetDateTime::now_utc() {
        Session::delete(&state.db, session.id).await?;
        return Err(AppError::Unauthorized("Session expired".into()));
    }

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;

    let access_token = keys.sign_access(user.id, session.id)?;
    let refresh_token = keys.sign_refresh(user.id, session.id)?;

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser::from(&user),
        redirect_to: None,
    }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<PublicUser>> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;
    Ok(Json(PublicUser::from(&user)))
}

fn login_rejected(next: Option<String>) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(LoginForm {
            next,
            errors: vec!["Invalid username or password".into()],
        }),
    )
        .into_response()
}

/// Return paths must stay inside the site; anything else falls back to the
/// home feed.
fn sanitize_next(next: Option<String>) -> String {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") => n,
        _ => "/".to_string(),
    }
}

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();
}

fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}
