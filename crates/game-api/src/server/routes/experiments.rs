/// Either a bare config or a config with storage options.
///
/// `WithOptions` must be tried first: every `ExperimentConfig` field has a default,
/// so the bare variant would accept an options object too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CreateExperimentRequest {
    WithOptions(CreateExperimentOptions),
    Config(ExperimentConfig),
}

#[derive(Debug, Deserialize)]
struct CreateExperimentOptions {
    config: ExperimentConfig,
    sqlite_path: Option<String>,
    replace_existing: Option<bool>,
}

#[derive(Debug, Serialize)]
struct CreateExperimentResponse {
    schema_version: String,
    experiment_id: String,
    status: ExperimentStatus,
    sqlite_path: String,
    replaced_active_experiment: bool,
}

#[derive(Debug, Deserialize)]
struct ListExperimentsQuery {
    page_size: Option<usize>,
    sqlite_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListExperimentsResponse {
    schema_version: String,
    active_experiment_id: Option<String>,
    experiments: Vec<PersistedExperimentSummary>,
}

#[derive(Debug, Serialize)]
struct ExperimentStatusResponse {
    #[serde(flatten)]
    status: ExperimentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    persistence_warning: Option<String>,
}

async fn create_experiment(
    State(state): State<AppState>,
    Json(request): Json<CreateExperimentRequest>,
) -> Result<Json<CreateExperimentResponse>, HttpApiError> {
    let (config, sqlite_path, replace_existing) = match request {
        CreateExperimentRequest::Config(config) => (config, default_sqlite_path(), true),
        CreateExperimentRequest::WithOptions(options) => (
            options.config,
            options
                .sqlite_path
                .filter(|path| !path.trim().is_empty())
                .unwrap_or_else(default_sqlite_path),
            options.replace_existing.unwrap_or(true),
        ),
    };

    let mut api = GameApi::from_config(config).map_err(HttpApiError::from_config)?;
    api.attach_sqlite_store(&sqlite_path)
        .map_err(HttpApiError::from_persistence)?;
    api.initialize_experiment_storage(replace_existing)
        .map_err(HttpApiError::from_persistence)?;

    let mut inner = state.inner.lock().await;
    let replaced_active_experiment = inner.api.is_some();
    let response = CreateExperimentResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        experiment_id: api.experiment_id().to_string(),
        status: api.status(),
        sqlite_path,
        replaced_active_experiment,
    };
    info!(
        experiment_id = %response.experiment_id,
        replaced_active_experiment,
        "experiment created"
    );
    inner.api = Some(api);

    Ok(Json(response))
}

async fn list_experiments(
    State(state): State<AppState>,
    Query(query): Query<ListExperimentsQuery>,
) -> Result<Json<ListExperimentsResponse>, HttpApiError> {
    let page_size = query.page_size.unwrap_or(100).clamp(1, MAX_PAGE_SIZE);

    let sqlite_path = query
        .sqlite_path
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path);

    let active_experiment_id = {
        let inner = state.inner.lock().await;
        inner
            .api
            .as_ref()
            .map(|api| api.experiment_id().to_string())
    };

    let store = SqliteRoundStore::open(sqlite_path).map_err(HttpApiError::from_persistence)?;
    let experiments = store
        .list_experiments(page_size)
        .map_err(HttpApiError::from_persistence)?;

    Ok(Json(ListExperimentsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        active_experiment_id,
        experiments,
    }))
}

async fn get_experiment_status(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
) -> Result<Json<ExperimentStatusResponse>, HttpApiError> {
    let inner = state.inner.lock().await;
    let api = require_experiment(&inner, &experiment_id)?;

    Ok(Json(ExperimentStatusResponse {
        status: api.status(),
        persistence_warning: api.last_persistence_error().map(str::to_string),
    }))
}
