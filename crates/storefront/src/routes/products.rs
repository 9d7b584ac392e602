//! Catalog route handlers.

use axum::{Json, extract::State};
use serde::Deserialize;
use tracing::instrument;

use corner_shop_core::{CategoryId, PageRequest, ProductId};

use super::extract::{ApiJson, ApiPath, ApiQuery, PageQuery};
use crate::error::Result;
use crate::models::{Product, ProductPage};
use crate::state::AppState;

/// One entry of a category search body.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum CategoryRef {
    Tagged {
        #[serde(rename = "categoryID")]
        category_id: CategoryId,
    },
    Bare(CategoryId),
}

impl CategoryRef {
    const fn id(self) -> CategoryId {
        match self {
            Self::Tagged { category_id } => category_id,
            Self::Bare(id) => id,
        }
    }
}

/// Paged catalog listing in product-id order.
#[instrument(skip(state, query))]
pub async fn index(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<ProductPage>> {
    let page = PageRequest::try_from(query)?;
    Ok(Json(state.catalog().list(page).await?))
}

/// Products carrying every listed category.
///
/// Accepts `[{"categoryID": 1}, ...]` or a bare `[1, ...]`.
#[instrument(skip(state, query, body))]
pub async fn by_categories(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PageQuery>,
    ApiJson(body): ApiJson<Vec<CategoryRef>>,
) -> Result<Json<ProductPage>> {
    let page = PageRequest::try_from(query)?;
    let mut categories: Vec<CategoryId> = body.into_iter().map(CategoryRef::id).collect();
    categories.sort_unstable();
    categories.dedup();

    Ok(Json(
        state
            .catalog()
            .search_by_categories(&categories, page)
            .await?,
    ))
}

/// Product detail.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<Json<Product>> {
    Ok(Json(state.catalog().product(id).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_category_body_shapes() {
        let tagged: Vec<CategoryRef> =
            serde_json::from_str(r#"[{"categoryID": 2}, {"categoryID": 5}]"#).unwrap();
        let bare: Vec<CategoryRef> = serde_json::from_str("[2, 5]").unwrap();

        let ids = |refs: Vec<CategoryRef>| refs.into_iter().map(CategoryRef::id).collect::<Vec<_>>();
        assert_eq!(ids(tagged), vec![CategoryId::new(2), CategoryId::new(5)]);
        assert_eq!(ids(bare), vec![CategoryId::new(2), CategoryId::new(5)]);
    }
}
