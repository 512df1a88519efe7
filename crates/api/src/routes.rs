//! HTTP route handlers.

pub mod admin;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;

use std::fmt::Display;
use std::str::FromStr;

use common::PageRequest;
use common::page::DEFAULT_LIMIT;
use serde::Deserialize;

use crate::error::ApiError;

/// Query string shared by the list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub order_id: Option<String>,
}

impl ListQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page.unwrap_or(1), self.limit.unwrap_or(DEFAULT_LIMIT))
    }

    /// Parses the `status` filter. An empty value means no filter.
    pub fn status<T>(&self) -> Result<Option<T>, ApiError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e| ApiError::BadRequest(format!("Invalid status filter: {e}"))),
        }
    }
}

/// Parses an identifier taken from the path or the body.
pub(crate) fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use domain::OrderStatus;

    #[test]
    fn test_page_request_defaults() {
        let query = ListQuery::default();
        assert_eq!(query.page_request(), PageRequest::default());
    }

    #[test]
    fn test_page_request_clamps() {
        let query = ListQuery {
            page: Some(0),
            limit: Some(1000),
            ..Default::default()
        };
        let page = query.page_request();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, common::page::MAX_LIMIT);
    }

    #[test]
    fn test_status_filter_parsing() {
        let mut query = ListQuery::default();
        assert_eq!(query.status::<OrderStatus>().unwrap(), None);

        query.status = Some("PAID".to_string());
        assert_eq!(query.status::<OrderStatus>().unwrap(), Some(OrderStatus::Paid));

        query.status = Some("LOST".to_string());
        assert!(matches!(
            query.status::<OrderStatus>(),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        let id = OrderId::new();
        assert_eq!(parse_id::<OrderId>(&id.to_string()).unwrap(), id);
        assert!(matches!(
            parse_id::<OrderId>("nope"),
            Err(ApiError::BadRequest(_))
        ));
    }
}
