//! Access to the scanning platform's REST API, plus an offline variant

pub mod client;
pub mod file_source;

pub use client::PlatformClient;
pub use file_source::FileSource;

use async_trait::async_trait;
use serde_json::Value;

use crate::application::errors::EngineError;
use crate::domain::recipe::QueryParams;
use crate::domain::ReportPeriod;

/// Project catalog endpoint, also used as the connection preflight target
pub const PROJECTS_ENDPOINT: &str = "/public/v0/projects";

/// Where report data comes from.
///
/// `PlatformClient` is the normal HTTP implementation; `FileSource` serves a
/// saved JSON payload so reports can be rebuilt offline.
#[async_trait]
pub trait PlatformDataSource: Send + Sync {
    /// Fetch every page of a list endpoint
    async fn fetch_all(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<Vec<Value>, EngineError>;

    /// Fetch the project catalog
    async fn list_projects(&self) -> Result<Vec<Value>, EngineError> {
        let params = QueryParams {
            limit: Some(1000),
            offset: Some(0),
            ..QueryParams::default()
        };
        self.fetch_all(PROJECTS_ENDPOINT, &params).await
    }

    /// Fetch all versions of one project
    async fn list_versions(&self, project_id: &str) -> Result<Vec<Value>, EngineError> {
        let endpoint = format!("{}/{}/versions", PROJECTS_ENDPOINT, project_id);
        self.fetch_all(&endpoint, &QueryParams::default()).await
    }

    /// Cheap auth and reachability check run before a report batch
    async fn test_connection(&self) -> Result<(), EngineError>;
}

/// Replace `${start}` / `${end}` in a filter with the period bounds.
///
/// The findings endpoint rejects the trailing `Z` that the other endpoints
/// require, so the rendered timestamps differ by endpoint.
pub fn substitute_period(filter: &str, endpoint: &str, period: &ReportPeriod) -> String {
    let utc_suffix = !endpoint.to_ascii_lowercase().contains("/findings");
    filter
        .replace("${start}", &period.start_timestamp(utc_suffix))
        .replace("${end}", &period.end_timestamp(utc_suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn period() -> ReportPeriod {
        ReportPeriod::new(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn findings_endpoint_gets_no_utc_suffix() {
        let out = substitute_period(
            "detected>=${start};detected<=${end}",
            "/public/v0/findings",
            &period(),
        );
        assert_eq!(out, "detected>=2025-03-01T00:00:00;detected<=2025-03-31T23:59:59");
    }

    #[test]
    fn other_endpoints_get_utc_suffix() {
        let out = substitute_period("created>=${start}", "/public/v0/scans", &period());
        assert_eq!(out, "created>=2025-03-01T00:00:00Z");
    }

    #[test]
    fn filters_without_placeholders_pass_through() {
        let out = substitute_period("severity==critical", "/public/v0/findings", &period());
        assert_eq!(out, "severity==critical");
    }
}
