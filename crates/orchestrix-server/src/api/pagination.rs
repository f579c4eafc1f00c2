use serde::Deserialize;
use utoipa::IntoParams;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Common `page`/`limit` query parameters for list endpoints.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    /// 1-based page number (default 1)
    pub page: Option<u64>,
    /// Page size (default 20, max 100)
    pub limit: Option<u64>,
}

impl PageParams {
    pub fn resolve(&self) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let params = PageParams {
            page: None,
            limit: None,
        };
        assert_eq!(params.resolve(), (1, DEFAULT_PAGE_SIZE));
    }

    #[test]
    fn zero_and_oversize_are_clamped() {
        let params = PageParams {
            page: Some(0),
            limit: Some(10_000),
        };
        assert_eq!(params.resolve(), (1, MAX_PAGE_SIZE));
    }
}
