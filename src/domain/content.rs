//! Read-only lookups into the CMS content tables
//!
//! Posts only need a small projection of the content they promote, so each
//! kind maps its own table onto the same `ContentSummary` shape.

use serde::{Deserialize, Serialize};
use sqlx::{Executor, Postgres};

use crate::domain::social::models::text_column;

/// Kind of CMS item a post promotes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Product,
    Blog,
    LandingPage,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Product => "product",
            ContentKind::Blog => "blog",
            ContentKind::LandingPage => "landingpage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "product" => Some(ContentKind::Product),
            "blog" => Some(ContentKind::Blog),
            "landingpage" | "landing_page" => Some(ContentKind::LandingPage),
            _ => None,
        }
    }

    /// Path segment of the public page, e.g. `/blog/<slug>`
    pub fn url_segment(&self) -> &'static str {
        self.as_str()
    }

    /// Query projecting this kind's table onto `ContentSummary`
    fn summary_query(&self) -> &'static str {
        match self {
            ContentKind::Product => {
                "SELECT title, slug, image, description AS excerpt, category
                 FROM products WHERE id = $1"
            }
            ContentKind::Blog => {
                "SELECT title, slug, image, excerpt, category
                 FROM blogs WHERE id = $1"
            }
            ContentKind::LandingPage => {
                "SELECT title, slug, image, description AS excerpt, NULL::text AS category
                 FROM landing_pages WHERE id = $1"
            }
        }
    }
}

text_column!(ContentKind);

/// Reference to one content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub kind: ContentKind,
    pub id: i64,
}

impl std::fmt::Display for ContentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.id)
    }
}

/// The fields captions and tracking URLs are built from
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ContentSummary {
    pub title: String,
    pub slug: String,
    pub image: Option<String>,
    pub excerpt: Option<String>,
    pub category: Option<String>,
}

impl ContentSummary {
    /// Public URL of the item before tracking parameters are added
    pub fn canonical_url(&self, site_base_url: &str, kind: ContentKind) -> String {
        format!(
            "{}/{}/{}",
            site_base_url.trim_end_matches('/'),
            kind.url_segment(),
            self.slug
        )
    }
}

pub async fn get_content_by_id<'e, E>(
    executor: E,
    content: ContentRef,
) -> Result<Option<ContentSummary>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(content.kind.summary_query())
        .bind(content.id)
        .fetch_optional(executor)
        .await
}
