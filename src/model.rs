use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Store-assigned article identifier, rendered as 32 lowercase hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArticleId(Uuid);

impl ArticleId {
    pub fn generate() -> Self {
        ArticleId(Uuid::new_v4())
    }

    /// Accepts any textual uuid form (simple, hyphenated, braced, urn).
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::try_parse(s).ok().map(ArticleId)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl Serialize for ArticleId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ArticleId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ArticleId::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid article id: {s}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub body: String,
    pub ctime: DateTime<Utc>,
}

impl Article {
    /// Builds a new article with a fresh id and the current time, truncated
    /// to the microsecond precision the store keeps.
    pub fn new(title: String, body: String) -> Self {
        Article {
            id: ArticleId::generate(),
            title,
            body,
            ctime: Utc::now().trunc_subsecs(6),
        }
    }
}

/// Body of `POST /api/save`. Client-supplied `id` and `ctime` are accepted
/// and discarded; the store assigns both.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateArticle {
    pub title: String,
    pub body: String,
    #[serde(default, rename = "id")]
    _id: Option<IgnoredAny>,
    #[serde(default, rename = "ctime")]
    _ctime: Option<IgnoredAny>,
}

impl CreateArticle {
    pub fn into_article(self) -> Article {
        Article::new(self.title, self.body)
    }
}

/// Body of `PUT /api/article/{id}`. Same shape as [`CreateArticle`]; the
/// path parameter names the target and `ctime` never changes.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateArticle {
    pub title: String,
    pub body: String,
    #[serde(default, rename = "id")]
    _id: Option<IgnoredAny>,
    #[serde(default, rename = "ctime")]
    _ctime: Option<IgnoredAny>,
}

impl UpdateArticle {
    pub fn apply(self, article: &mut Article) {
        article.title = self.title;
        article.body = self.body;
    }
}
