use contracts::{LiveStatus, PageKind};

use super::*;

fn temp_db_path(name: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time should be monotonic")
        .as_nanos();

    std::env::temp_dir()
        .join(format!("resilience_server_{name}_{nanos}.sqlite"))
        .to_string_lossy()
        .into_owned()
}

fn participant_path(participant_id: &str) -> Path<(String, String)> {
    Path(("otree_nd".to_string(), participant_id.to_string()))
}

async fn create(state: &AppState, name: &str) -> String {
    let sqlite_path = temp_db_path(name);
    let config = ExperimentConfig {
        num_rounds: 2,
        seed: Some(5),
        ..ExperimentConfig::default()
    };
    let request = CreateExperimentRequest::WithOptions(CreateExperimentOptions {
        config,
        sqlite_path: Some(sqlite_path.clone()),
        replace_existing: Some(true),
    });
    create_experiment(State(state.clone()), Json(request))
        .await
        .expect("create experiment");
    sqlite_path
}

async fn register(state: &AppState, participant_id: &str) -> ParticipantStatus {
    let Json(status) = register_participant(
        State(state.clone()),
        Path("otree_nd".to_string()),
        Json(RegisterParticipantRequest {
            participant_id: participant_id.to_string(),
        }),
    )
    .await
    .expect("register");
    status
}

#[test]
fn create_request_accepts_both_shapes() {
    let bare: CreateExperimentRequest =
        serde_json::from_str(r#"{"num_rounds": 4}"#).expect("bare config");
    assert!(matches!(
        bare,
        CreateExperimentRequest::Config(ref config) if config.num_rounds == 4
    ));

    let wrapped: CreateExperimentRequest = serde_json::from_str(
        r#"{"config": {"num_rounds": 3}, "replace_existing": false}"#,
    )
    .expect("wrapped config");
    assert!(matches!(
        wrapped,
        CreateExperimentRequest::WithOptions(ref options)
            if options.config.num_rounds == 3 && options.replace_existing == Some(false)
    ));
}

#[test]
fn round_order_query_is_validated() {
    assert_eq!(parse_round_order(None).expect("default"), RoundOrder::Ascending);
    assert_eq!(
        parse_round_order(Some("desc")).expect("desc"),
        RoundOrder::Descending
    );
    let err = parse_round_order(Some("sideways")).expect_err("bad order");
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert_eq!(err.error.error_code, ErrorCode::InvalidQuery);
}

#[test]
fn session_errors_map_to_status_codes() {
    let missing = HttpApiError::from_session(SessionError::UnknownParticipant("x".to_string()));
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.error.error_code, ErrorCode::ParticipantNotFound);

    let invalid = HttpApiError::from_session(SessionError::Settlement(
        SettlementError::InvalidInput {
            spending: 101,
            max_spending: 100,
        },
    ));
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.error.error_code, ErrorCode::InvalidInput);

    let conflict = HttpApiError::from_session(SessionError::MissingSpending {
        participant_id: "x".to_string(),
        round_number: 1,
    });
    assert_eq!(conflict.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let state = AppState::new();
    let config = ExperimentConfig {
        max_spending: 0,
        ..ExperimentConfig::default()
    };
    let err = create_experiment(
        State(state.clone()),
        Json(CreateExperimentRequest::WithOptions(CreateExperimentOptions {
            config,
            sqlite_path: Some(temp_db_path("invalid")),
            replace_existing: Some(true),
        })),
    )
    .await
    .expect_err("invalid config");
    assert_eq!(err.error.error_code, ErrorCode::InvalidConfig);
    assert!(state.inner.lock().await.api.is_none());
}

#[tokio::test]
async fn unknown_experiment_is_not_found() {
    let state = AppState::new();
    let err = get_experiment_status(State(state), Path("missing".to_string()))
        .await
        .expect_err("no active experiment");
    assert_eq!(err.status, StatusCode::NOT_FOUND);
    assert_eq!(err.error.error_code, ErrorCode::ExperimentNotFound);
}

#[tokio::test]
async fn participant_plays_through_handlers() {
    let state = AppState::new();
    let sqlite_path = create(&state, "flow").await;

    let status = register(&state, "p1").await;
    assert_eq!(status.page, PageKind::Landing);

    post_advance(State(state.clone()), participant_path("p1"))
        .await
        .expect("leave landing");

    let Json(live) = post_live(
        State(state.clone()),
        participant_path("p1"),
        Json(LiveRequest::CalculateResult { investment: 100 }),
    )
    .await
    .expect("live");
    assert_eq!(live.status, LiveStatus::Success);
    let result = live.result.expect("result");
    assert_eq!(result.total_costs, 100);
    assert_eq!(result.expected_profit, 9_900);

    let Json(rejected) = post_live(
        State(state.clone()),
        participant_path("p1"),
        Json(LiveRequest::CalculateResult { investment: 150 }),
    )
    .await
    .expect("live error response");
    assert_eq!(rejected.status, LiveStatus::Error);

    post_advance(State(state.clone()), participant_path("p1"))
        .await
        .expect("round 2");

    let err = post_advance(State(state.clone()), participant_path("p1"))
        .await
        .expect_err("no spending for round 2");
    assert_eq!(err.status, StatusCode::CONFLICT);

    post_spending(
        State(state.clone()),
        participant_path("p1"),
        Json(SpendingRequest { spending: 100 }),
    )
    .await
    .expect("spending");
    let Json(advanced) = post_advance(State(state.clone()), participant_path("p1"))
        .await
        .expect("results page");
    assert_eq!(advanced.status.page, PageKind::Results);
    let fallback = advanced.fallback_result.expect("fallback settlement");
    assert_eq!(fallback.total_costs, 200);

    let Json(results) = get_results_page(State(state.clone()), participant_path("p1"))
        .await
        .expect("results");
    assert_eq!(results.summary.final_profit, 9_800);
    assert_eq!(results.summary.average_spending, 100);

    let Json(records) = get_records(
        State(state.clone()),
        participant_path("p1"),
        Query(RecordsQuery {
            order: Some("desc".to_string()),
        }),
    )
    .await
    .expect("records");
    let rounds: Vec<u32> = records.records.iter().map(|r| r.round_number).collect();
    assert_eq!(rounds, vec![2, 1]);

    let store = SqliteRoundStore::open(&sqlite_path).expect("reopen store");
    assert_eq!(
        store.load_records("otree_nd", Some("p1")).expect("load").len(),
        2
    );

    let _ = std::fs::remove_file(sqlite_path);
}

#[tokio::test]
async fn unregistered_participant_is_not_found() {
    let state = AppState::new();
    let sqlite_path = create(&state, "ghost").await;

    let err = get_game_page(State(state.clone()), participant_path("ghost"))
        .await
        .expect_err("not registered");
    assert_eq!(err.error.error_code, ErrorCode::ParticipantNotFound);

    let err = register_participant(
        State(state.clone()),
        Path("otree_nd".to_string()),
        Json(RegisterParticipantRequest {
            participant_id: "  ".to_string(),
        }),
    )
    .await
    .expect_err("blank participant id");
    assert_eq!(err.error.error_code, ErrorCode::InvalidInput);

    let err = register_participant(
        State(state.clone()),
        Path("otree_nd".to_string()),
        Json(RegisterParticipantRequest {
            participant_id: " p1".to_string(),
        }),
    )
    .await
    .expect_err("padded participant id");
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert_eq!(err.error.error_code, ErrorCode::InvalidInput);
    let inner = state.inner.lock().await;
    assert!(inner.api.as_ref().expect("active").participants().is_empty());
    drop(inner);

    let _ = std::fs::remove_file(sqlite_path);
}
