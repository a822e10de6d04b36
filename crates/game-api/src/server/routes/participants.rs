#[derive(Debug, Deserialize)]
struct RegisterParticipantRequest {
    participant_id: String,
}

#[derive(Debug, Serialize)]
struct ListParticipantsResponse {
    schema_version: String,
    experiment_id: String,
    participants: Vec<ParticipantStatus>,
}

#[derive(Debug, Deserialize)]
struct SpendingRequest {
    spending: i64,
}

#[derive(Debug, Serialize)]
struct AdvanceResponse {
    status: ParticipantStatus,
    /// Present when leaving the game page settled the round.
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback_result: Option<LiveResult>,
}

#[derive(Debug, Deserialize)]
struct RecordsQuery {
    order: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecordsResponse {
    schema_version: String,
    experiment_id: String,
    participant_id: String,
    order: RoundOrder,
    records: Vec<RoundRecord>,
}

async fn register_participant(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
    Json(request): Json<RegisterParticipantRequest>,
) -> Result<Json<ParticipantStatus>, HttpApiError> {
    validate_participant_id(&request.participant_id)?;

    let mut inner = state.inner.lock().await;
    let api = require_experiment_mut(&mut inner, &experiment_id)?;
    Ok(Json(api.register_participant(&request.participant_id)))
}

async fn list_participants(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
) -> Result<Json<ListParticipantsResponse>, HttpApiError> {
    let inner = state.inner.lock().await;
    let api = require_experiment(&inner, &experiment_id)?;

    Ok(Json(ListParticipantsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        experiment_id,
        participants: api.participants(),
    }))
}

async fn get_participant(
    State(state): State<AppState>,
    Path((experiment_id, participant_id)): Path<(String, String)>,
) -> Result<Json<ParticipantStatus>, HttpApiError> {
    let inner = state.inner.lock().await;
    let api = require_experiment(&inner, &experiment_id)?;
    api.participant_status(&participant_id)
        .map(Json)
        .map_err(HttpApiError::from_session)
}

async fn post_live(
    State(state): State<AppState>,
    Path((experiment_id, participant_id)): Path<(String, String)>,
    Json(request): Json<LiveRequest>,
) -> Result<Json<LiveResponse>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let api = require_experiment_mut(&mut inner, &experiment_id)?;
    api.live(&participant_id, request)
        .map(Json)
        .map_err(HttpApiError::from_session)
}

async fn post_spending(
    State(state): State<AppState>,
    Path((experiment_id, participant_id)): Path<(String, String)>,
    Json(request): Json<SpendingRequest>,
) -> Result<Json<ParticipantStatus>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let api = require_experiment_mut(&mut inner, &experiment_id)?;
    api.record_spending(&participant_id, request.spending)
        .map(Json)
        .map_err(HttpApiError::from_session)
}

async fn post_advance(
    State(state): State<AppState>,
    Path((experiment_id, participant_id)): Path<(String, String)>,
) -> Result<Json<AdvanceResponse>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let api = require_experiment_mut(&mut inner, &experiment_id)?;
    let outcome = api
        .advance(&participant_id)
        .map_err(HttpApiError::from_session)?;

    Ok(Json(AdvanceResponse {
        status: outcome.status,
        fallback_result: outcome.fallback.map(|settled| settled.to_live_result()),
    }))
}

async fn get_game_page(
    State(state): State<AppState>,
    Path((experiment_id, participant_id)): Path<(String, String)>,
) -> Result<Json<GamePageView>, HttpApiError> {
    let inner = state.inner.lock().await;
    let api = require_experiment(&inner, &experiment_id)?;
    api.game_page(&participant_id)
        .map(Json)
        .map_err(HttpApiError::from_session)
}

async fn get_results_page(
    State(state): State<AppState>,
    Path((experiment_id, participant_id)): Path<(String, String)>,
) -> Result<Json<ResultsView>, HttpApiError> {
    let inner = state.inner.lock().await;
    let api = require_experiment(&inner, &experiment_id)?;
    api.results_page(&participant_id)
        .map(Json)
        .map_err(HttpApiError::from_session)
}

async fn get_records(
    State(state): State<AppState>,
    Path((experiment_id, participant_id)): Path<(String, String)>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<RecordsResponse>, HttpApiError> {
    let order = parse_round_order(query.order.as_deref())?;

    let inner = state.inner.lock().await;
    let api = require_experiment(&inner, &experiment_id)?;
    let records = api
        .records(&participant_id, order)
        .map_err(HttpApiError::from_session)?;

    Ok(Json(RecordsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        experiment_id,
        participant_id,
        order,
        records,
    }))
}
