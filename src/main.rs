use axum::{
    Json, Router, debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use pokedex::catalog::{ALL_TYPES, TYPE_FILTERS};
use pokedex::{
    Action, Battle, CatalogQuery, Config, DetailView, FavoriteRecord, FavoritesStore,
    PokemonClient, PokemonRecord, Session, SharedSession, SortOption,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FORMAT_ENV: &str = "POKEDEX_LOG_FORMAT";

struct AppContext {
    session: SharedSession<StdRng>,
    client: PokemonClient,
    config: Config,
}

type Shared = Arc<AppContext>;

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

impl AppContext {
    fn with_session<T>(&self, f: impl FnOnce(&mut Session<StdRng>) -> T) -> Result<T, ApiError> {
        self.session
            .with_session(f)
            .ok_or_else(|| ApiError::internal("session unavailable"))
    }

    fn load_catalog(&self) {
        let client = self.client.clone();
        let limit = self.config.pokemon.list_limit;
        self.session.load_catalog(async move { client.fetch_catalog(limit).await });
    }
}

#[derive(Deserialize)]
struct CatalogParams {
    search: Option<String>,
    r#type: Option<String>,
    sort: Option<SortOption>,
}

#[derive(Serialize)]
struct CatalogResponse {
    query: CatalogQuery,
    total: usize,
    pokemon: Vec<PokemonRecord>,
    error: Option<String>,
}

#[derive(Serialize)]
struct BattleView {
    message: String,
    #[serde(flatten)]
    battle: Battle,
}

impl From<&Battle> for BattleView {
    fn from(battle: &Battle) -> Self {
        Self {
            message: battle.message(),
            battle: battle.clone(),
        }
    }
}

#[derive(Serialize)]
struct QuizView {
    scrambled: String,
    last_guess_correct: Option<bool>,
    message: &'static str,
}

#[derive(Deserialize)]
struct GuessRequest {
    guess: String,
}

#[tokio::main]
async fn main() {
    let json_logs = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // axum logs rejections from built-in extractors with the `axum::rejection`
                // target, at `TRACE` level. `axum::rejection=trace` enables showing those events
                format!(
                    "{}=debug,pokedex=debug,tower_http=debug,axum::rejection=trace",
                    env!("CARGO_CRATE_NAME")
                )
                .into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let client = match PokemonClient::new(config.pokemon.clone()) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to create catalog client: {}", e);
            std::process::exit(1);
        }
    };

    let favorites = FavoritesStore::from_config(&config.favorites);
    let session = Session::new(favorites, StdRng::from_os_rng());
    let bind = config.server.bind.clone();

    let ctx = Arc::new(AppContext {
        session: SharedSession::new(session),
        client,
        config,
    });

    ctx.load_catalog();

    let app = Router::new()
        .route("/catalog", get(get_catalog_handler))
        .route("/catalog/refresh", post(refresh_catalog_handler))
        .route("/types", get(get_types_handler))
        .route(
            "/pokemon/{name}",
            get(get_pokemon_handler).delete(close_pokemon_handler),
        )
        .route("/pokemon/{name}/favorite", post(toggle_favorite_handler))
        .route("/pokemon/{name}/battle", post(start_battle_handler))
        .route("/favorites", get(get_favorites_handler))
        .route("/battle", get(get_battle_handler).delete(leave_battle_handler))
        .route("/quiz", get(get_quiz_handler).post(start_quiz_handler))
        .route("/quiz/guess", post(submit_guess_handler))
        .route("/quiz/next", post(next_quiz_handler))
        .with_state(ctx);

    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to address {}: {}", bind, e);
            std::process::exit(1);
        }
    };

    match listener.local_addr() {
        Ok(addr) => tracing::info!("listening on {}", addr),
        Err(_) => tracing::info!("listening on {}", bind),
    }

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

#[debug_handler]
async fn get_catalog_handler(
    State(ctx): State<Shared>,
    Query(params): Query<CatalogParams>,
) -> ApiResult<CatalogResponse> {
    let query = CatalogQuery {
        search: params.search.unwrap_or_default(),
        type_filter: params.r#type.unwrap_or_else(|| ALL_TYPES.to_string()),
        sort: params.sort.unwrap_or_default(),
    };
    ctx.with_session(|session| {
        session.dispatch(Action::SetQuery(query));
        let state = session.state();
        Json(CatalogResponse {
            query: state.query.clone(),
            total: state.catalog.len(),
            pokemon: state.visible.clone(),
            error: state.error.clone(),
        })
    })
}

#[debug_handler]
async fn refresh_catalog_handler(State(ctx): State<Shared>) -> StatusCode {
    tracing::info!("Catalog refresh requested");
    ctx.load_catalog();
    StatusCode::ACCEPTED
}

async fn get_types_handler() -> Json<Vec<&'static str>> {
    Json(TYPE_FILTERS.to_vec())
}

fn select(session: &mut Session<StdRng>, name: &str) -> Result<DetailView, ApiError> {
    let already_selected = session
        .state()
        .detail
        .as_ref()
        .is_some_and(|d| d.record.name.eq_ignore_ascii_case(name));
    if !already_selected {
        session.dispatch(Action::Select(name.to_string()));
    }
    match session.state().detail.as_ref() {
        Some(detail) if detail.record.name.eq_ignore_ascii_case(name) => Ok(detail.clone()),
        _ => Err(ApiError::not_found(format!("no Pokémon named {}", name))),
    }
}

#[debug_handler]
async fn get_pokemon_handler(
    State(ctx): State<Shared>,
    Path(name): Path<String>,
) -> ApiResult<DetailView> {
    ctx.with_session(|session| {
        // Re-select so the favorite flag is read fresh.
        session.dispatch(Action::CloseDetail);
        select(session, &name)
    })?
    .map(Json)
}

#[debug_handler]
async fn close_pokemon_handler(
    State(ctx): State<Shared>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    tracing::debug!("Closing detail for {}", name);
    ctx.with_session(|session| session.dispatch(Action::CloseDetail))?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler]
async fn toggle_favorite_handler(
    State(ctx): State<Shared>,
    Path(name): Path<String>,
) -> ApiResult<DetailView> {
    ctx.with_session(|session| {
        select(session, &name)?;
        session.dispatch(Action::ToggleFavorite);
        select(session, &name)
    })?
    .map(Json)
}

#[debug_handler]
async fn get_favorites_handler(State(ctx): State<Shared>) -> ApiResult<Vec<FavoriteRecord>> {
    ctx.with_session(|session| Json(session.favorites().favorites()))
}

#[debug_handler]
async fn start_battle_handler(
    State(ctx): State<Shared>,
    Path(name): Path<String>,
) -> ApiResult<BattleView> {
    ctx.with_session(|session| select(session, &name))??;
    if !ctx.session.start_battle(ctx.config.battle.turn_delay()) {
        return Err(ApiError::not_found("no opponent available"));
    }

    ctx.with_session(|session| {
        session
            .state()
            .battle
            .as_ref()
            .map(|battle| Json(BattleView::from(battle)))
            .ok_or_else(|| ApiError::internal("battle did not start"))
    })?
}

#[debug_handler]
async fn get_battle_handler(State(ctx): State<Shared>) -> ApiResult<BattleView> {
    ctx.with_session(|session| {
        session
            .state()
            .battle
            .as_ref()
            .map(|battle| Json(BattleView::from(battle)))
            .ok_or_else(|| ApiError::not_found("no battle in progress"))
    })?
}

#[debug_handler]
async fn leave_battle_handler(State(ctx): State<Shared>) -> Result<StatusCode, ApiError> {
    ctx.session.leave_battle();
    Ok(StatusCode::NO_CONTENT)
}

fn quiz_view(session: &Session<StdRng>) -> Result<QuizView, ApiError> {
    session
        .state()
        .quiz
        .as_ref()
        .map(|quiz| QuizView {
            scrambled: quiz.scrambled().to_string(),
            last_guess_correct: quiz.last_guess_correct(),
            message: quiz.message(),
        })
        .ok_or_else(|| ApiError::not_found("no quiz round, is the catalog loaded?"))
}

#[debug_handler]
async fn start_quiz_handler(State(ctx): State<Shared>) -> ApiResult<QuizView> {
    ctx.with_session(|session| {
        session.dispatch(Action::StartQuiz);
        quiz_view(session)
    })?
    .map(Json)
}

#[debug_handler]
async fn get_quiz_handler(State(ctx): State<Shared>) -> ApiResult<QuizView> {
    ctx.with_session(|session| quiz_view(session))?.map(Json)
}

#[debug_handler]
async fn submit_guess_handler(
    State(ctx): State<Shared>,
    Json(request): Json<GuessRequest>,
) -> ApiResult<QuizView> {
    ctx.with_session(|session| {
        session.dispatch(Action::SubmitGuess(request.guess));
        quiz_view(session)
    })?
    .map(Json)
}

#[debug_handler]
async fn next_quiz_handler(State(ctx): State<Shared>) -> ApiResult<QuizView> {
    ctx.with_session(|session| {
        session.dispatch(Action::NextQuiz);
        quiz_view(session)
    })?
    .map(Json)
}
