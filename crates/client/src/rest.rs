//! Request/response access to the domain resources.
//!
//! Every request carries the session's bearer token. List responses look like
//! `{ "<plural>": [...], "pages": n, "total": n }`; mutations answer with
//! `{ "<singular>": {...} }` or the bare record.
//!
//! A `401`/`422` answer means the credential is no longer valid: the session is
//! logged out before the error is returned.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use url::Url;

use myduka_auth::Session;
use myduka_core::{ApiError, ErrorBody, ErrorClass, PageMeta, RecordId};
use myduka_records::{Domain, RecordFilter};

/// Page and filter parameters of a list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub per_page: u32,
    pub search: Option<String>,
    pub status: Option<String>,
}

impl ListQuery {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
            search: None,
            status: None,
        }
    }

    pub fn with_filter(mut self, filter: &RecordFilter) -> Self {
        self.search = filter.search.clone().filter(|s| !s.trim().is_empty());
        self.status = filter.status.clone().filter(|s| !s.trim().is_empty());
        self
    }

    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("page", self.page.to_string()), ("per_page", self.per_page.to_string())];
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        if let Some(status) = &self.status {
            pairs.push(("status", status.clone()));
        }
        pairs
    }
}

/// One page of records plus its pagination metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base: Url,
    session: Arc<Session>,
}

impl RestClient {
    pub fn new(base: Url, session: Arc<Session>, request_timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::network(e.to_string()))?;
        Ok(Self { http, base, session })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// `GET /<resource>?page=&per_page=&search=&status=`
    pub async fn list<D: Domain>(&self, query: &ListQuery) -> Result<Page<D::Record>, ApiError> {
        let url = self.url(&[D::RESOURCE])?;
        let body = self
            .send(self.http.request(Method::GET, url).query(&query.pairs()))
            .await?;
        let page = parse_list::<D>(body, query)?;
        tracing::debug!(
            domain = D::NAME,
            page = page.meta.page,
            records = page.records.len(),
            total = page.meta.total,
            "list fetched"
        );
        Ok(page)
    }

    /// `POST /<resource>`
    pub async fn create<D: Domain>(&self, body: &Value) -> Result<D::Record, ApiError> {
        let url = self.url(&[D::RESOURCE])?;
        let body = self.send(self.http.request(Method::POST, url).json(body)).await?;
        parse_single::<D>(body)
    }

    /// `PUT /<resource>/<id>`
    pub async fn update<D: Domain>(&self, id: RecordId, body: &Value) -> Result<D::Record, ApiError> {
        let url = self.url(&[D::RESOURCE, &id.to_string()])?;
        let body = self.send(self.http.request(Method::PUT, url).json(body)).await?;
        parse_single::<D>(body)
    }

    /// `PATCH /<resource>/<id>/<action>` for state transitions such as
    /// `approve`, `decline`, `status` or `read`.
    pub async fn action<D: Domain>(&self, id: RecordId, action: &str, body: &Value) -> Result<D::Record, ApiError> {
        let url = self.url(&[D::RESOURCE, &id.to_string(), action])?;
        let body = self.send(self.http.request(Method::PATCH, url).json(body)).await?;
        parse_single::<D>(body)
    }

    /// `DELETE /<resource>/<id>`
    pub async fn delete<D: Domain>(&self, id: RecordId) -> Result<(), ApiError> {
        let url = self.url(&[D::RESOURCE, &id.to_string()])?;
        self.send(self.http.request(Method::DELETE, url)).await?;
        Ok(())
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::decode(format!("api base {} cannot take a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, ApiError> {
        let credential = self.session.credential().ok_or_else(|| ApiError::Unauthorized {
            status: 401,
            message: "not logged in".to_string(),
        })?;

        let resp = request
            .bearer_auth(credential.access_token())
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = retry_after(resp.headers());
            let body: ErrorBody = resp.json().await.unwrap_or_default();
            let err = ApiError::from_status(status.as_u16(), body, retry_after);
            tracing::warn!(status = status.as_u16(), class = ?err.class(), "request failed: {err}");
            if err.class() == ErrorClass::Authentication {
                tracing::warn!("credential rejected by the api; logging out");
                self.session.logout();
            }
            return Err(err);
        }

        let bytes = resp.bytes().await.map_err(map_transport_error)?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ApiError::decode(e.to_string()))
    }
}

fn map_transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::network(err.to_string())
    }
}

/// `Retry-After` in delta-seconds form.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn parse_list<D: Domain>(body: Value, query: &ListQuery) -> Result<Page<D::Record>, ApiError> {
    let (items, pages, total) = match body {
        Value::Array(items) => (items, None, None),
        Value::Object(mut map) => {
            let items = match map.remove(D::PLURAL_KEY) {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => {
                    return Err(ApiError::decode(format!(
                        "`{}` is not an array: {other}",
                        D::PLURAL_KEY
                    )));
                }
            };
            let pages = map.get("pages").and_then(Value::as_u64);
            let total = map.get("total").and_then(Value::as_u64);
            (items, pages, total)
        }
        other => return Err(ApiError::decode(format!("unexpected list response: {other}"))),
    };

    let records = items
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<D::Record>, _>>()
        .map_err(|e| ApiError::decode(format!("invalid {} record: {e}", D::NAME)))?;

    let total = total.unwrap_or(records.len() as u64);
    let pages = match pages {
        Some(pages) => u32::try_from(pages).unwrap_or(u32::MAX),
        None => u32::try_from(total.div_ceil(u64::from(query.per_page.max(1)))).unwrap_or(u32::MAX),
    };

    Ok(Page {
        records,
        meta: PageMeta::new(query.page, query.per_page, pages, total),
    })
}

fn parse_single<D: Domain>(body: Value) -> Result<D::Record, ApiError> {
    let record = match body {
        Value::Object(mut map) if matches!(map.get(D::SINGULAR_KEY), Some(Value::Object(_))) => {
            map.remove(D::SINGULAR_KEY).unwrap_or_default()
        }
        other => other,
    };
    serde_json::from_value(record).map_err(|e| ApiError::decode(format!("invalid {} record: {e}", D::NAME)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use myduka_auth::InMemoryCredentialStore;
    use myduka_records::{SupplyRequests, Users};
    use reqwest::header::HeaderValue;
    use serde_json::json;

    #[test]
    fn list_reads_plural_key_and_totals() {
        let body = json!({
            "supply_requests": [
                {"id": 1, "product_name": "Sugar", "status": "PENDING"},
                {"id": 2, "product_name": "Salt", "status": "APPROVED"}
            ],
            "pages": 3,
            "total": 22
        });
        let page = parse_list::<SupplyRequests>(body, &ListQuery::new(2, 10)).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.meta, PageMeta::new(2, 10, 3, 22));
    }

    #[test]
    fn list_without_totals_derives_them() {
        let body = json!([{"id": 1, "product_name": "Sugar"}]);
        let page = parse_list::<SupplyRequests>(body, &ListQuery::new(1, 10)).unwrap();
        assert_eq!(page.meta.total, 1);
        assert_eq!(page.meta.pages, 1);
    }

    #[test]
    fn list_with_bad_record_is_a_decode_error() {
        let body = json!({"users": [{"id": 1}]});
        let err = parse_list::<Users>(body, &ListQuery::new(1, 10)).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn single_accepts_wrapped_and_bare_records() {
        let wrapped = json!({"supply_request": {"id": 5, "product_name": "Rice"}, "message": "ok"});
        assert_eq!(parse_single::<SupplyRequests>(wrapped).unwrap().id, RecordId::new(5));

        let bare = json!({"id": 6, "product_name": "Rice"});
        assert_eq!(parse_single::<SupplyRequests>(bare).unwrap().id, RecordId::new(6));
    }

    #[test]
    fn query_carries_only_non_empty_filters() {
        let q = ListQuery::new(1, 10).with_filter(&RecordFilter::search("  ").with_status("PENDING"));
        assert_eq!(
            q.pairs(),
            vec![
                ("page", "1".to_string()),
                ("per_page", "10".to_string()),
                ("status", "PENDING".to_string())
            ]
        );
    }

    #[test]
    fn retry_after_header_in_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(3)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn urls_keep_the_api_prefix() {
        let session = Arc::new(Session::new(Arc::new(InMemoryCredentialStore::new())));
        let client = RestClient::new(
            Url::parse("http://localhost:5000/api/").unwrap(),
            session,
            Duration::from_secs(1),
        )
        .unwrap();
        let url = client.url(&["supply-requests", "4", "approve"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/api/supply-requests/4/approve");
    }
}
