use crate::error::{AppError, AppResult};
use crate::models::PrincipalSummary;
use crate::store::SharedStore;

const SEARCH_LIMIT: i64 = 50;

#[derive(Clone)]
pub struct SearchService {
    store: SharedStore,
}

impl SearchService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Users and groups whose id or name contains `keyword`
    pub async fn search_principals(&self, keyword: &str) -> AppResult<Vec<PrincipalSummary>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(AppError::bad_request("keyword must not be empty"));
        }
        self.store.search_principals(keyword, SEARCH_LIMIT).await
    }
}
