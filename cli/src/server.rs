use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use cookbook_core::Error as CoreError;
use cookbook_core::db::Database;
use cookbook_core::models::{
    Image, Ingredient, IngredientDraft, Method, MethodDraft, Portion, Recipe, RecipeFields,
    RecipeQuery, null_as_zero, parse_identity,
};

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
}

impl AppState {
    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct ListRecipesQuery {
    search: Option<String>,
    #[serde(rename = "sortKey")]
    sort_key: Option<String>,
    #[serde(rename = "sortDirection")]
    sort_direction: Option<String>,
    #[serde(rename = "ingredientNames")]
    ingredient_names: Option<String>,
}

/// Clients send whole recipes when reordering; only the id matters.
#[derive(Deserialize)]
struct RecipeRef {
    #[serde(default, deserialize_with = "null_as_zero")]
    id: i64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SetPortionRequest {
    value: f64,
    measurement: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(_) => Self::NotFound(err.to_string()),
            CoreError::InvalidIdentity(_) | CoreError::Validation(_) => {
                Self::BadRequest(err.to_string())
            }
            CoreError::Persistence(_) | CoreError::Json(_) => Self::Internal(err.into()),
        }
    }
}

fn deleted_or_not_found(deleted: bool, what: &str, id: i64) -> Result<StatusCode, ApiError> {
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("{what} {id} not found")))
    }
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Recipe handlers ---

async fn list_recipes(
    State(state): State<AppState>,
    Query(params): Query<ListRecipesQuery>,
) -> Result<Json<Vec<Recipe>>, ApiError> {
    let query = RecipeQuery::parse(
        params.search.as_deref(),
        params.sort_key.as_deref(),
        params.sort_direction.as_deref(),
        params.ingredient_names.as_deref(),
    )?;
    let recipes = state.db().list_recipes(&query)?;
    Ok(Json(recipes))
}

async fn reorder_recipes(
    State(state): State<AppState>,
    Json(body): Json<Vec<RecipeRef>>,
) -> Result<Json<Vec<Recipe>>, ApiError> {
    let ids: Vec<i64> = body.iter().map(|r| r.id).collect();
    let recipes = state.db().reorder_recipes(&ids)?;
    Ok(Json(recipes))
}

async fn create_recipe(
    State(state): State<AppState>,
    Json(body): Json<RecipeFields>,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let recipe = state.db().create_recipe(&body)?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Recipe>, ApiError> {
    let id = parse_identity(&raw_id)?;
    let recipe = state.db().get_recipe(id)?;
    Ok(Json(recipe))
}

async fn update_recipe(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(body): Json<RecipeFields>,
) -> Result<Json<Recipe>, ApiError> {
    let id = parse_identity(&raw_id)?;
    let recipe = state.db().update_recipe(id, &body)?;
    Ok(Json(recipe))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_identity(&raw_id)?;
    let deleted = state.db().delete_recipe(id)?;
    deleted_or_not_found(deleted, "Recipe", id)
}

// --- Portion handlers ---

async fn set_portion(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(body): Json<SetPortionRequest>,
) -> Result<Json<Option<Recipe>>, ApiError> {
    let recipe_id = parse_identity(&raw_id)?;
    let recipe = state
        .db()
        .set_portion(recipe_id, body.value, &body.measurement)?;
    Ok(Json(recipe))
}

async fn delete_portion(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_identity(&raw_id)?;
    let deleted = state.db().delete_portion(id)?;
    deleted_or_not_found(deleted, "Portion", id)
}

async fn list_portions(State(state): State<AppState>) -> Result<Json<Vec<Portion>>, ApiError> {
    Ok(Json(state.db().list_portions()?))
}

// --- Ingredient handlers ---

async fn reconcile_ingredients(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(body): Json<Vec<IngredientDraft>>,
) -> Result<Json<Option<Recipe>>, ApiError> {
    let recipe_id = parse_identity(&raw_id)?;
    let recipe = state.db().reconcile_ingredients(recipe_id, &body)?;
    Ok(Json(recipe))
}

async fn upsert_ingredient(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(body): Json<IngredientDraft>,
) -> Result<Json<Option<Recipe>>, ApiError> {
    let recipe_id = parse_identity(&raw_id)?;
    let recipe = state.db().upsert_ingredient(recipe_id, &body)?;
    Ok(Json(recipe))
}

async fn delete_ingredient(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_identity(&raw_id)?;
    let deleted = state.db().delete_ingredient(id)?;
    deleted_or_not_found(deleted, "Ingredient", id)
}

async fn list_ingredients(
    State(state): State<AppState>,
) -> Result<Json<Vec<Ingredient>>, ApiError> {
    Ok(Json(state.db().list_ingredients()?))
}

// --- Method handlers ---

async fn reconcile_methods(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(body): Json<Vec<MethodDraft>>,
) -> Result<Json<Option<Recipe>>, ApiError> {
    let recipe_id = parse_identity(&raw_id)?;
    let recipe = state.db().reconcile_methods(recipe_id, &body)?;
    Ok(Json(recipe))
}

async fn upsert_method(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(body): Json<MethodDraft>,
) -> Result<Json<Option<Recipe>>, ApiError> {
    let recipe_id = parse_identity(&raw_id)?;
    let recipe = state.db().upsert_method(recipe_id, &body)?;
    Ok(Json(recipe))
}

async fn delete_method(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_identity(&raw_id)?;
    let deleted = state.db().delete_method(id)?;
    deleted_or_not_found(deleted, "Method", id)
}

async fn list_methods(State(state): State<AppState>) -> Result<Json<Vec<Method>>, ApiError> {
    Ok(Json(state.db().list_methods()?))
}

// --- Image handlers ---

async fn upload_image(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Option<Recipe>>, ApiError> {
    let recipe_id = parse_identity(&raw_id)?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some("image") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read image: {e}")))?;
            upload = Some(bytes);
            break;
        }
    }
    let bytes =
        upload.ok_or_else(|| ApiError::BadRequest("Missing 'image' form field".to_string()))?;

    let recipe = state.db().set_image(recipe_id, &bytes)?;
    Ok(Json(recipe))
}

async fn list_images(State(state): State<AppState>) -> Result<Json<Vec<Image>>, ApiError> {
    Ok(Json(state.db().list_images()?))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/recipes", get(list_recipes).put(reorder_recipes))
        .route("/recipe", post(create_recipe))
        .route(
            "/recipe/{id}",
            get(get_recipe).put(update_recipe).delete(delete_recipe),
        )
        .route("/portion/{id}", post(set_portion).delete(delete_portion))
        .route("/portions", get(list_portions))
        .route("/ingredients/{id}", post(reconcile_ingredients))
        .route(
            "/ingredient/{id}",
            post(upsert_ingredient).delete(delete_ingredient),
        )
        .route("/ingredients", get(list_ingredients))
        .route("/methods/{id}", post(reconcile_methods))
        .route("/method/{id}", post(upsert_method).delete(delete_method))
        .route("/methods", get(list_methods))
        .route("/image/{id}", post(upload_image))
        .route("/images", get(list_images))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(db: Database, port: u16, bind: &str) -> anyhow::Result<()> {
    let state = AppState {
        db: Arc::new(Mutex::new(db)),
    };

    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        warn!(
            "Listening on {bind} without authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
