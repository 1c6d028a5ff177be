//! Limit/offset pagination for list endpoints.

use axum::http::Uri;
use serde::{Deserialize, Serialize};

use crate::services::{Page, PageRequest};

const MAX_LIMIT: i64 = 100;

#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<PageParams> for PageRequest {
    fn from(params: PageParams) -> Self {
        Self {
            limit: params.limit.filter(|limit| *limit > 0).map(|limit| limit.min(MAX_LIMIT)),
            offset: params.offset.unwrap_or_default().max(0),
        }
    }
}

/// A list response. Requests with a `limit` get the paginated envelope,
/// the rest a bare array.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Paginated { count: i64, next: Option<String>, previous: Option<String>, results: Vec<T> },
    Plain(Vec<T>),
}

impl<T> Listing<T> {
    pub fn new(page: Page<T>, request: PageRequest, uri: &Uri) -> Self {
        let (Some(limit), Some(count)) = (request.limit, page.total) else {
            return Self::Plain(page.items);
        };
        let offset = request.offset;

        let next = offset.checked_add(limit).filter(|next| *next < count).map(|next| link(uri, limit, Some(next)));
        let previous = (offset > 0).then(|| {
            let previous = offset - limit;
            link(uri, limit, (previous > 0).then_some(previous))
        });

        Self::Paginated { count, next, previous, results: page.items }
    }
}

/// `uri` with its window moved; other query parameters are kept.
fn link(uri: &Uri, limit: i64, offset: Option<i64>) -> String {
    let mut pairs: Vec<String> = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty() && !pair.starts_with("limit=") && !pair.starts_with("offset="))
        .map(str::to_string)
        .collect();
    pairs.push(format!("limit={limit}"));
    if let Some(offset) = offset {
        pairs.push(format!("offset={offset}"));
    }
    format!("{}?{}", uri.path(), pairs.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(total: Option<i64>) -> Page<i32> { Page { items: vec![1, 2], total } }

    #[test]
    fn limit_is_clamped() {
        let request = PageRequest::from(PageParams { limit: Some(1000), offset: Some(-5) });
        assert_eq!(request, PageRequest { limit: Some(MAX_LIMIT), offset: 0 });
        assert_eq!(PageRequest::from(PageParams { limit: Some(0), offset: None }).limit, None);
    }

    #[test]
    fn unpaginated_lists_are_bare_arrays() {
        let uri: Uri = "/api/categories".parse().unwrap();
        let listing = Listing::new(page(None), PageRequest::default(), &uri);
        assert_eq!(serde_json::to_value(listing).unwrap(), json!([1, 2]));
    }

    #[test]
    fn middle_page_links_both_ways() {
        let uri: Uri = "/api/products?search=phone&limit=2&offset=2".parse().unwrap();
        let request = PageRequest { limit: Some(2), offset: 2 };
        let listing = Listing::new(page(Some(7)), request, &uri);

        assert_eq!(
            serde_json::to_value(listing).unwrap(),
            json!({
                "count": 7,
                "next": "/api/products?search=phone&limit=2&offset=4",
                "previous": "/api/products?search=phone&limit=2",
                "results": [1, 2],
            })
        );
    }

    #[test]
    fn huge_offset_has_no_next() {
        let uri: Uri = "/api/products?limit=10&offset=9223372036854775807".parse().unwrap();
        let request = PageRequest::from(PageParams { limit: Some(10), offset: Some(i64::MAX) });
        let listing = Listing::new(Page { items: Vec::<i32>::new(), total: Some(3) }, request, &uri);
        let Listing::Paginated { next, previous, .. } = listing else {
            panic!("expected a paginated listing");
        };
        assert_eq!(next, None);
        assert_eq!(previous.as_deref(), Some("/api/products?limit=10&offset=9223372036854775797"));
    }

    #[test]
    fn last_page_has_no_next() {
        let uri: Uri = "/api/shops?limit=5&offset=5".parse().unwrap();
        let listing = Listing::new(page(Some(7)), PageRequest { limit: Some(5), offset: 5 }, &uri);
        let Listing::Paginated { next, previous, .. } = listing else {
            panic!("expected a paginated listing");
        };
        assert_eq!(next, None);
        assert_eq!(previous.as_deref(), Some("/api/shops?limit=5"));
    }
}
