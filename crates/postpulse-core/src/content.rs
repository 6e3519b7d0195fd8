//! Published content catalog and page classification.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Post,
    Page,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Post => "post",
            ContentKind::Page => "page",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "post" => Some(ContentKind::Post),
            "page" => Some(ContentKind::Page),
            _ => None,
        }
    }
}

/// One post or static page as synced from the markdown content pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub slug: String,
    pub title: String,
    pub kind: ContentKind,
    #[serde(default = "default_published")]
    pub published: bool,
}

fn default_published() -> bool {
    true
}

/// Classify a path the way the site's tracker does when it records a view.
pub fn page_type_for_path(path: &str) -> &'static str {
    match path {
        "/" | "" => "home",
        "/stats" => "stats",
        _ => "page",
    }
}

/// Human-readable label for a tracked path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLabel {
    pub title: String,
    pub page_type: String,
}

/// Slug → title lookup over *published* entries only.
#[derive(Debug, Clone, Default)]
pub struct ContentCatalog {
    posts: HashMap<String, String>,
    pages: HashMap<String, String>,
}

impl ContentCatalog {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = ContentEntry>,
    {
        let mut catalog = Self::default();
        for entry in entries.into_iter().filter(|e| e.published) {
            match entry.kind {
                ContentKind::Post => catalog.posts.insert(entry.slug, entry.title),
                ContentKind::Page => catalog.pages.insert(entry.slug, entry.title),
            };
        }
        catalog
    }

    pub fn published_posts(&self) -> u64 {
        self.posts.len() as u64
    }

    pub fn published_pages(&self) -> u64 {
        self.pages.len() as u64
    }

    /// Resolve the title and page type shown in the per-page breakdown.
    ///
    /// Home and the stats page are fixed; otherwise the slug (path without
    /// its leading `/`) is matched against posts first, then pages. Anything
    /// unmatched keeps its path as title and is typed `other`.
    pub fn label_for(&self, path: &str) -> PageLabel {
        let label = |title: &str, page_type: &str| PageLabel {
            title: title.to_string(),
            page_type: page_type.to_string(),
        };

        if path == "/" || path.is_empty() {
            return label("Home", "home");
        }
        if path == "/stats" {
            return label("Stats", "stats");
        }

        let slug = path.strip_prefix('/').unwrap_or(path);
        if let Some(title) = self.posts.get(slug) {
            label(title, "blog")
        } else if let Some(title) = self.pages.get(slug) {
            label(title, "page")
        } else {
            label(path, "other")
        }
    }
}
