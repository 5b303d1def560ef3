// Behavior Points - REST API with Axum
//
// The identity collaborator in front of this service authenticates the
// caller and forwards who they are in two headers: `x-actor-id` and
// `x-actor-role`.

use crate::accounts::{FieldError, LoginRequest, ProfileUpdate, SignupRequest};
use crate::entities::{Actor, Behavior, Polarity, Role, UserProfile, AVATARS, CLASSES};
use crate::service::{
    ActivityItem, Dashboard, LedgerReceipt, PointsService, RegistrationRequest, ServiceError,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    service: Arc<Mutex<PointsService>>,
}

impl AppState {
    pub fn new(service: PointsService) -> Self {
        AppState {
            service: Arc::new(Mutex::new(service)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, PointsService>, AppError> {
        self.service.lock().map_err(|_| AppError::StatePoisoned)
    }
}

// ============================================================================
// Responses
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<Vec<FieldError>> {
    fn failure(message: String, fields: Vec<FieldError>) -> Self {
        Self {
            success: false,
            data: fields,
            error: Some(message),
        }
    }
}

/// Leaderboard row; only the first name is exposed
#[derive(Serialize)]
struct LeaderboardRow {
    rank: usize,
    student_id: String,
    first_name: String,
    initials: String,
    avatar_url: String,
    points: i64,
}

#[derive(Serialize)]
struct BehaviorResponse {
    id: String,
    name: String,
    description: String,
    points: i64,
    polarity: Polarity,
    requires_confirmation: bool,
}

impl From<&Behavior> for BehaviorResponse {
    fn from(behavior: &Behavior) -> Self {
        Self {
            id: behavior.id.clone(),
            name: behavior.name.clone(),
            description: behavior.description.clone(),
            points: behavior.points,
            polarity: behavior.polarity,
            requires_confirmation: behavior.is_severe(),
        }
    }
}

#[derive(Serialize)]
struct ClassOption {
    id: &'static str,
    name: &'static str,
}

#[derive(Serialize)]
struct ProfileOptions {
    classes: Vec<ClassOption>,
    avatars: Vec<&'static str>,
}

#[derive(Deserialize)]
struct BehaviorFilter {
    polarity: Option<String>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing or invalid actor headers")]
    Unauthenticated,

    #[error("Unknown polarity filter: {0}")]
    BadFilter(String),

    #[error("Service state unavailable")]
    StatePoisoned,

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::BadFilter(_) => StatusCode::BAD_REQUEST,
            AppError::StatePoisoned => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Service(err) => match err {
                ServiceError::Validation(_) | ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                ServiceError::ConfirmationRequired { .. } | ServiceError::EmailInUse => {
                    StatusCode::CONFLICT
                }
                ServiceError::Forbidden(_) | ServiceError::PersistencePermissionDenied(_) => {
                    StatusCode::FORBIDDEN
                }
                ServiceError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                ServiceError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!(status = status.as_u16(), "Request rejected: {}", self);
        }

        let fields = match self {
            AppError::Service(ServiceError::InvalidInput(ref fields)) => fields.clone(),
            _ => Vec::new(),
        };

        (status, Json(ApiResponse::failure(self.to_string(), fields))).into_response()
    }
}

// ============================================================================
// Actor extraction
// ============================================================================

pub struct AuthenticatedActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let uid = header(ACTOR_ID_HEADER).ok_or(AppError::Unauthenticated)?;
        let role = header(ACTOR_ROLE_HEADER)
            .and_then(|role| Role::parse(&role))
            .ok_or(AppError::Unauthenticated)?;

        Ok(AuthenticatedActor(Actor::new(uid, role)))
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/students - Roster in registration order
async fn list_students(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let service = state.lock()?;
    Ok(Json(ApiResponse::ok(service.students().to_vec())))
}

/// GET /api/students/:id/dashboard - Balance, rank and recent activity
async fn student_dashboard(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<Json<ApiResponse<Dashboard>>, AppError> {
    let service = state.lock()?;
    Ok(Json(ApiResponse::ok(service.dashboard(&student_id)?)))
}

/// GET /api/students/:id/history - Every ledger entry, newest first
async fn student_history(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<ActivityItem>>>, AppError> {
    let service = state.lock()?;
    Ok(Json(ApiResponse::ok(service.history(&student_id)?)))
}

/// GET /api/behaviors?polarity=positive|negative - Behavior catalog
async fn list_behaviors(
    State(state): State<AppState>,
    Query(filter): Query<BehaviorFilter>,
) -> Result<impl IntoResponse, AppError> {
    let polarity = match filter.polarity.as_deref() {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(Polarity::parse(raw).ok_or_else(|| AppError::BadFilter(raw.to_string()))?),
    };

    let service = state.lock()?;
    let behaviors: Vec<BehaviorResponse> = service
        .catalog()
        .all()
        .iter()
        .filter(|b| polarity.map_or(true, |p| b.polarity == p))
        .map(BehaviorResponse::from)
        .collect();

    Ok(Json(ApiResponse::ok(behaviors)))
}

/// GET /api/leaderboard - Ranking by balance
async fn leaderboard(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let service = state.lock()?;
    let rows: Vec<LeaderboardRow> = service
        .leaderboard()
        .into_iter()
        .map(|entry| LeaderboardRow {
            rank: entry.rank,
            first_name: entry.student.first_name().to_string(),
            initials: entry.student.initials(),
            student_id: entry.student.id,
            avatar_url: entry.student.avatar_url,
            points: entry.student.points,
        })
        .collect();

    Ok(Json(ApiResponse::ok(rows)))
}

/// POST /api/registrations - Apply a behavior to a student
async fn register_behavior(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(request): Json<RegistrationRequest>,
) -> Result<Json<ApiResponse<LedgerReceipt>>, AppError> {
    let mut service = state.lock()?;
    let receipt = service.register_behavior(&actor, &request)?;
    Ok(Json(ApiResponse::ok(receipt)))
}

/// POST /api/signup - Create an account
async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut service = state.lock()?;
    let profile = service.sign_up(&request)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(profile))))
}

/// POST /api/login - Check credentials
async fn log_in(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ApiResponse<UserProfile>>, AppError> {
    let service = state.lock()?;
    Ok(Json(ApiResponse::ok(service.log_in(&request)?)))
}

/// GET /api/profile/:uid - Own profile (admins can read any)
async fn get_profile(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(uid): Path<String>,
) -> Result<Json<ApiResponse<UserProfile>>, AppError> {
    if actor.uid != uid && actor.role != Role::Admin {
        return Err(ServiceError::Forbidden(format!("{} cannot read the profile of {}", actor.uid, uid)).into());
    }

    let service = state.lock()?;
    Ok(Json(ApiResponse::ok(service.profile(&uid)?)))
}

/// PUT /api/profile/:uid - Update display name, photo and class
async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(uid): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<ApiResponse<UserProfile>>, AppError> {
    let mut service = state.lock()?;
    Ok(Json(ApiResponse::ok(service.update_profile(&actor, &uid, &update)?)))
}

/// GET /api/profile-options - Classes and stock avatars
async fn profile_options() -> impl IntoResponse {
    Json(ApiResponse::ok(ProfileOptions {
        classes: CLASSES
            .iter()
            .map(|&(id, name)| ClassOption { id, name })
            .collect(),
        avatars: AVATARS.to_vec(),
    }))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(service: PointsService) -> Router {
    let state = AppState::new(service);

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/students", get(list_students))
        .route("/students/:id/dashboard", get(student_dashboard))
        .route("/students/:id/history", get(student_history))
        .route("/behaviors", get(list_behaviors))
        .route("/leaderboard", get(leaderboard))
        .route("/registrations", post(register_behavior))
        .route("/signup", post(sign_up))
        .route("/login", post(log_in))
        .route("/profile/:uid", get(get_profile).put(update_profile))
        .route("/profile-options", get(profile_options))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::BehaviorCatalog;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        router(PointsService::in_memory(BehaviorCatalog::builtin()).unwrap())
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: Method, uri: &str, actor: Option<(&str, &str)>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some((uid, role)) = actor {
            builder = builder
                .header(ACTOR_ID_HEADER, uid)
                .header(ACTOR_ROLE_HEADER, role);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn registration(student: &str, behavior: &str, confirmed: bool) -> Value {
        json!({
            "student_id": student,
            "behavior_id": behavior,
            "justification": "Empurrou um colega no recreio.",
            "confirmed": confirmed,
        })
    }

    #[tokio::test]
    async fn test_health_and_leaderboard() {
        let app = app();

        let (status, body) = send(&app, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");

        let (status, body) = send(&app, get("/api/leaderboard")).await;
        assert_eq!(status, StatusCode::OK);
        let rows = body["data"].as_array().unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0]["rank"], 1);
        assert_eq!(rows[0]["first_name"], "Alex");
        assert_eq!(rows[0]["initials"], "AJ");
    }

    #[tokio::test]
    async fn test_behavior_filter() {
        let app = app();

        let (_, body) = send(&app, get("/api/behaviors?polarity=negative")).await;
        let behaviors = body["data"].as_array().unwrap();
        assert_eq!(behaviors.len(), 3);
        assert_eq!(behaviors[2]["requires_confirmation"], true);

        let (status, _) = send(&app, get("/api/behaviors?polarity=sideways")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_registration_flow() {
        let app = app();
        let teacher = Some(("t1", "teacher"));

        let (status, _) = send(
            &app,
            json_request(Method::POST, "/api/registrations", None, registration("1", "b1", false)),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            json_request(Method::POST, "/api/registrations", Some(("1", "student")), registration("2", "b1", false)),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            json_request(Method::POST, "/api/registrations", teacher, registration("1", "n3", false)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            json_request(Method::POST, "/api/registrations", teacher, registration("1", "n3", true)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["outcome"]["new_balance"], 900);

        let (_, body) = send(&app, get("/api/students/1/dashboard")).await;
        assert_eq!(body["data"]["student"]["points"], 900);
        assert_eq!(body["data"]["rank"], 5);
        assert_eq!(body["data"]["recent_activity"][0]["behavior_name"], "Infração Grave");
    }

    #[tokio::test]
    async fn test_short_justification_is_bad_request() {
        let app = app();
        let body = json!({"student_id": "1", "behavior_id": "b1", "justification": "curto"});

        let (status, body) = send(
            &app,
            json_request(Method::POST, "/api/registrations", Some(("t1", "teacher")), body),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_student_history() {
        let app = app();
        let teacher = Some(("t1", "teacher"));

        for behavior in ["b1", "n1"] {
            let (status, _) = send(
                &app,
                json_request(Method::POST, "/api/registrations", teacher, registration("3", behavior, false)),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = send(&app, get("/api/students/3/history")).await;
        assert_eq!(status, StatusCode::OK);
        let items = body["data"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["entry"]["behavior_id"], "n1");
        assert_eq!(items[0]["entry"]["balance_after"], 1000);
        assert_eq!(items[1]["entry"]["actor"], "t1");

        let (status, body) = send(&app, get("/api/students/nobody/history")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_read_only_store_is_forbidden() {
        let service = PointsService::in_memory(BehaviorCatalog::builtin()).unwrap();
        service.connection().pragma_update(None, "query_only", true).unwrap();
        let app = router(service);

        let (status, body) = send(
            &app,
            json_request(Method::POST, "/api/registrations", Some(("t1", "teacher")), registration("1", "b1", false)),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);

        let (_, body) = send(&app, get("/api/students/1/dashboard")).await;
        assert_eq!(body["data"]["student"]["points"], 1000);
    }

    #[tokio::test]
    async fn test_signup_login_profile() {
        let app = app();

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/api/signup",
                None,
                json!({"name": "Lia Santos", "email": "lia@escola.com", "password": "secret1", "role": "student"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let uid = body["data"]["uid"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/api/signup",
                None,
                json!({"name": "X", "email": "bad", "password": "1", "role": "student"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["data"].as_array().unwrap().len(), 3);

        let (status, _) = send(
            &app,
            json_request(
                Method::POST,
                "/api/login",
                None,
                json!({"email": "lia@escola.com", "password": "wrong1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let uri = format!("/api/profile/{}", uid);
        let update = json!({"display_name": "Lia S.", "photo_url": "", "class_id": "8A"});

        let (status, _) = send(
            &app,
            json_request(Method::PUT, &uri, Some(("intruder", "parent")), update.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            json_request(Method::PUT, &uri, Some((uid.as_str(), "student")), update),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["class_id"], "8A");

        let (_, body) = send(&app, get("/api/leaderboard")).await;
        let names: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|row| row["first_name"].as_str())
            .collect();
        assert!(names.contains(&"Lia"));
    }
}
