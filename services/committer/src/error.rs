use axum::http::StatusCode;
use minechain::LedgerError;
use tracing::error;

pub type ApiError = (StatusCode, String);

/// Map a service error to an HTTP status and body by the `LedgerError`
/// found in its chain.
pub fn api_error(e: anyhow::Error) -> ApiError {
    let ledger = e.chain().find_map(|cause| cause.downcast_ref::<LedgerError>());
    match ledger {
        Some(conflict @ LedgerError::ChainConflict { .. }) => (StatusCode::CONFLICT, conflict.to_string()),
        Some(dup @ LedgerError::DuplicateEvent(_)) => (StatusCode::CONFLICT, dup.to_string()),
        Some(bad @ LedgerError::MalformedEvent(_)) => (StatusCode::BAD_REQUEST, bad.to_string()),
        _ => {
            error!("request failed: {e:?}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub fn not_found(what: &str) -> ApiError {
    (StatusCode::NOT_FOUND, format!("{what} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn conflict_maps_to_409_through_context() {
        let e = Err::<(), _>(LedgerError::ChainConflict { expected_height: 3, attempted_height: 2 })
            .context("persisting block")
            .unwrap_err();
        let (status, body) = api_error(e);
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, "commit conflict, retry");
    }

    #[test]
    fn malformed_maps_to_400() {
        let (status, _) = api_error(LedgerError::MalformedEvent("missing walletAddress".into()).into());
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn other_errors_are_500() {
        let (status, body) = api_error(anyhow::anyhow!("db down"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "db down");
    }
}
