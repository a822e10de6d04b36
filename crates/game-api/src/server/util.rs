fn apply_cors_headers(headers: &mut axum::http::HeaderMap) {
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-max-age"),
        HeaderValue::from_static("3600"),
    );
}

fn default_sqlite_path() -> String {
    std::env::var("GAME_SQLITE_PATH")
        .ok()
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SQLITE_PATH.to_string())
}

fn parse_round_order(raw: Option<&str>) -> Result<RoundOrder, HttpApiError> {
    match raw.map(str::trim) {
        None | Some("") | Some("asc") => Ok(RoundOrder::Ascending),
        Some("desc") => Ok(RoundOrder::Descending),
        Some(other) => Err(HttpApiError::invalid_query(
            "order must be asc or desc",
            Some(format!("order={other}")),
        )),
    }
}

fn validate_participant_id(participant_id: &str) -> Result<(), HttpApiError> {
    if participant_id.trim().is_empty() {
        return Err(HttpApiError::invalid_input(
            "participant_id must not be empty",
            None,
        ));
    }
    if participant_id.trim() != participant_id {
        return Err(HttpApiError::invalid_input(
            "participant_id must not have surrounding whitespace",
            Some(format!("participant_id={participant_id:?}")),
        ));
    }
    Ok(())
}
