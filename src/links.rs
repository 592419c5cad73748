//! Navigable references: the absolute URLs used on the wire in place of raw
//! ids, and the reverse lookup applied when a client sends one back.

use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Links {
    base: String,
    // `base` with a trailing slash, so relative references join beneath it.
    root: Option<Url>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The value does not point at a resource of the expected kind.
    NoMatch,
}

impl From<url::ParseError> for LinkError {
    fn from(_: url::ParseError) -> Self {
        LinkError::NoMatch
    }
}

impl Links {
    /// `base` is the externally visible root of the API, e.g.
    /// `https://blog.example.com/api`.
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        let root = Url::parse(&format!("{base}/")).ok();
        if root.is_none() {
            tracing::warn!(
                "public base URL '{}' is not absolute; relative references will not resolve",
                base
            );
        }
        Self { base, root }
    }

    pub fn user(&self, id: i64) -> String {
        format!("{}/users/{}", self.base, id)
    }

    pub fn topic(&self, id: i64) -> String {
        format!("{}/topics/{}", self.base, id)
    }

    /// Extracts the topic id from a reference produced by [`Links::topic`].
    /// The host part is ignored; only the path has to match.
    pub fn resolve_topic(&self, reference: &str) -> Result<i64, LinkError> {
        self.resolve(reference, "topics")
    }

    fn resolve(&self, reference: &str, collection: &str) -> Result<i64, LinkError> {
        let reference = reference.trim();
        let url = match Url::parse(reference) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                self.root.as_ref().ok_or(LinkError::NoMatch)?.join(reference)?
            }
            Err(err) => return Err(err.into()),
        };
        if !matches!(url.scheme(), "http" | "https") {
            return Err(LinkError::NoMatch);
        }

        let base_path = self
            .root
            .as_ref()
            .map_or("", |root| root.path().trim_end_matches('/'));
        let path = url.path().strip_prefix(base_path).ok_or(LinkError::NoMatch)?;
        let path = path.strip_suffix('/').unwrap_or(path);

        let mut segments = path.strip_prefix('/').ok_or(LinkError::NoMatch)?.split('/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(kind), Some(id), None) if kind == collection => {
                if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(LinkError::NoMatch);
                }
                id.parse().map_err(|_| LinkError::NoMatch)
            }
            _ => Err(LinkError::NoMatch),
        }
    }
}
