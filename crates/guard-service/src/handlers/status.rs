//! Status echo handler.

use tracing::instrument;

/// Body returned by the status route.
pub const STATUS_MESSAGE: &str = "working ..";

/// Handler for GET /users/status/check
///
/// Only reachable once the guard has allowed the request; under the secured
/// profile that means the caller holds the developer role.
#[instrument(skip_all, name = "guard.handlers.status")]
pub async fn status_check() -> &'static str {
    tracing::debug!(target: "guard.handlers.status", "Status check");
    STATUS_MESSAGE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_message() {
        assert_eq!(status_check().await, "working ..");
    }
}
