#[derive(Clone)]
struct AppState {
    inner: std::sync::Arc<Mutex<ServerInner>>,
}

impl AppState {
    fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(Mutex::new(ServerInner::default())),
        }
    }
}

/// One active experiment per server; creating a new one replaces it.
#[derive(Debug, Default)]
struct ServerInner {
    api: Option<GameApi>,
}

fn require_experiment<'a>(
    inner: &'a ServerInner,
    experiment_id: &str,
) -> Result<&'a GameApi, HttpApiError> {
    let Some(api) = inner.api.as_ref() else {
        return Err(HttpApiError::experiment_not_found(experiment_id, None));
    };

    if api.experiment_id() != experiment_id {
        return Err(HttpApiError::experiment_not_found(
            experiment_id,
            Some(api.experiment_id()),
        ));
    }

    Ok(api)
}

fn require_experiment_mut<'a>(
    inner: &'a mut ServerInner,
    experiment_id: &str,
) -> Result<&'a mut GameApi, HttpApiError> {
    let active_id = inner
        .api
        .as_ref()
        .map(|api| api.experiment_id().to_string());
    let Some(api) = inner.api.as_mut() else {
        return Err(HttpApiError::experiment_not_found(experiment_id, None));
    };

    if api.experiment_id() != experiment_id {
        return Err(HttpApiError::experiment_not_found(
            experiment_id,
            active_id.as_deref(),
        ));
    }

    Ok(api)
}
