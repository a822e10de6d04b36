#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "server io error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn experiment_not_found(requested_id: &str, active_id: Option<&str>) -> Self {
        let details = active_id.map(|active| {
            format!("requested_experiment_id={requested_id} active_experiment_id={active}")
        });
        Self {
            status: StatusCode::NOT_FOUND,
            error: ApiError::new(
                ErrorCode::ExperimentNotFound,
                "experiment_id does not match the active experiment",
                details,
            ),
        }
    }

    fn invalid_input(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::InvalidInput, message, details),
        }
    }

    fn invalid_query(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::InvalidQuery, message, details),
        }
    }

    fn state_conflict(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            error: ApiError::new(ErrorCode::ExperimentStateConflict, message, details),
        }
    }

    fn internal(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ApiError::new(ErrorCode::InternalError, message, details),
        }
    }

    fn from_config(err: ConfigError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(
                ErrorCode::InvalidConfig,
                "experiment config is invalid",
                Some(err.to_string()),
            ),
        }
    }

    fn from_session(err: SessionError) -> Self {
        match err {
            SessionError::UnknownParticipant(participant_id) => Self {
                status: StatusCode::NOT_FOUND,
                error: ApiError::new(
                    ErrorCode::ParticipantNotFound,
                    "participant is not registered",
                    Some(format!("participant_id={participant_id}")),
                ),
            },
            SessionError::Settlement(err @ SettlementError::InvalidInput { .. }) => {
                Self::invalid_input(err.to_string(), None)
            }
            other @ (SessionError::WrongPage { .. }
            | SessionError::MissingSpending { .. }
            | SessionError::Settlement(SettlementError::RoundOutOfRange { .. })) => {
                Self::state_conflict(other.to_string(), None)
            }
        }
    }

    fn from_persistence(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotAttached => {
                Self::invalid_query("persistence store is not attached", None)
            }
            PersistenceError::ExperimentAlreadyExists(experiment_id) => Self::state_conflict(
                "experiment_id already exists; pass replace_existing=true to replace",
                Some(format!("experiment_id={experiment_id}")),
            ),
            other => Self::internal("persistence operation failed", Some(other.to_string())),
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
