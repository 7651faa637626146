use serde::Serialize;
use utoipa::ToSchema;

/// Coarse backend status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    /// No usable storage backend; room events fail until it comes back.
    Degraded,
}

/// Body returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
}

impl HealthResponse {
    pub fn new(degraded: bool) -> Self {
        let status = if degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Ok
        };
        Self { status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_lowercase_status() {
        assert_eq!(
            serde_json::to_value(HealthResponse::new(false)).unwrap(),
            json!({"status": "ok"})
        );
        assert_eq!(
            serde_json::to_value(HealthResponse::new(true)).unwrap(),
            json!({"status": "degraded"})
        );
    }
}
