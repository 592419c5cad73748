//! What anonymous readers of the public feed may see: published articles only.
//! Kept apart from `query` so matching and visibility compose in the controller.

use crate::models::Article;

pub fn is_public(article: &Article) -> bool {
    article.is_published()
}

/// Drops every article that is not published, preserving order.
pub fn published_only(articles: Vec<Article>) -> Vec<Article> {
    articles.into_iter().filter(is_public).collect()
}
