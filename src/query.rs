use serde::Deserialize;
use utoipa::IntoParams;

use crate::models::Article;

/// ArticleSearch
///
/// Query parameters accepted by the article listing endpoints.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ArticleSearch {
    /// Case-insensitive substring matched against title and text.
    pub search: Option<String>,
}

/// ArticleQuery
///
/// Answers "which articles match this request". It knows nothing about who is
/// asking; viewer-dependent narrowing lives in `visibility`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleQuery {
    search: Option<String>,
}

impl ArticleQuery {
    /// Every article.
    pub fn all() -> Self {
        Self::default()
    }

    /// Articles whose title or text contains `term`, ignoring case.
    /// An empty term matches everything.
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
        }
    }

    pub fn term(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn matches(&self, article: &Article) -> bool {
        match &self.search {
            None => true,
            Some(term) => {
                let needle = term.to_lowercase();
                article.title.to_lowercase().contains(&needle)
                    || article.text.to_lowercase().contains(&needle)
            }
        }
    }

    /// Filters `articles`, returning each match once in primary-key order.
    pub fn apply(&self, articles: impl IntoIterator<Item = Article>) -> Vec<Article> {
        let mut matched: Vec<Article> = articles
            .into_iter()
            .filter(|article| self.matches(article))
            .collect();
        matched.sort_by_key(|article| article.id);
        matched.dedup_by_key(|article| article.id);
        matched
    }

    /// The term as an `ILIKE` pattern, with LIKE wildcards in the user's input
    /// escaped so they match literally.
    pub fn like_pattern(&self) -> Option<String> {
        self.search.as_ref().map(|term| {
            let mut escaped = String::with_capacity(term.len() + 2);
            escaped.push('%');
            for ch in term.chars() {
                if matches!(ch, '%' | '_' | '\\') {
                    escaped.push('\\');
                }
                escaped.push(ch);
            }
            escaped.push('%');
            escaped
        })
    }
}

impl From<ArticleSearch> for ArticleQuery {
    fn from(params: ArticleSearch) -> Self {
        match params.search {
            Some(term) => ArticleQuery::search(term),
            None => ArticleQuery::all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: i64, title: &str, text: &str) -> Article {
        Article {
            id,
            title: title.into(),
            text: text.into(),
            ..Article::default()
        }
    }

    #[test]
    fn search_matches_title_or_text_case_insensitively() {
        let query = ArticleQuery::search("donald");
        assert!(query.matches(&article(1, "Title", "Donald is programming")));
        assert!(query.matches(&article(2, "DONALD", "body")));
        assert!(!query.matches(&article(3, "Title", "body")));
    }

    #[test]
    fn apply_returns_each_match_once_in_id_order() {
        let rows = vec![
            article(3, "rust", "rust"),
            article(1, "rust", "go"),
            article(2, "go", "go"),
            article(3, "rust", "rust"),
        ];
        let ids: Vec<i64> = ArticleQuery::search("RUST")
            .apply(rows)
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn no_match_is_empty_and_empty_term_is_everything() {
        let rows = vec![article(1, "a", "b"), article(2, "c", "d")];
        assert!(ArticleQuery::search("unknown").apply(rows.clone()).is_empty());
        assert_eq!(ArticleQuery::search("").apply(rows.clone()).len(), 2);
        assert_eq!(ArticleQuery::all().apply(rows).len(), 2);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(
            ArticleQuery::search("50%_off\\").like_pattern().as_deref(),
            Some("%50\\%\\_off\\\\%")
        );
        assert_eq!(ArticleQuery::all().like_pattern(), None);
    }

    #[test]
    fn search_params_convert_to_query() {
        let query: ArticleQuery = ArticleSearch {
            search: Some("x".into()),
        }
        .into();
        assert_eq!(query.term(), Some("x"));
        assert_eq!(ArticleQuery::from(ArticleSearch::default()), ArticleQuery::all());
    }
}
