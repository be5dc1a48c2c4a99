use mongodb::bson::Document;
use mongodb::options::FindOptions;

pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> Self {
        Page {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, MAX_LIMIT),
        }
    }

    /// Saturates at `i64::MAX` so it always fits a Mongo `$skip`.
    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit).max(0) as u64
    }

    pub fn find_options(&self, sort: Document) -> FindOptions {
        FindOptions::builder()
            .skip(self.skip())
            .limit(self.limit)
            .sort(sort)
            .build()
    }

    pub fn pages(&self, total: u64) -> i64 {
        (total as f64 / self.limit as f64).ceil() as i64
    }

    pub fn summary(&self, total: u64) -> serde_json::Value {
        serde_json::json!({
            "page": self.page,
            "limit": self.limit,
            "total": total,
            "pages": self.pages(total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        let page = Page::new(None, None, 10);
        assert_eq!(page, Page { page: 1, limit: 10 });

        let page = Page::new(Some(0), Some(500), 10);
        assert_eq!(page, Page { page: 1, limit: MAX_LIMIT });

        let page = Page::new(Some(-3), Some(0), 20);
        assert_eq!(page, Page { page: 1, limit: 1 });
    }

    #[test]
    fn skip_and_page_count() {
        let page = Page::new(Some(3), Some(20), 10);
        assert_eq!(page.skip(), 40);
        assert_eq!(page.pages(0), 0);
        assert_eq!(page.pages(41), 3);

        let summary = page.summary(41);
        assert_eq!(summary["pages"], 3);
        assert_eq!(summary["total"], 41);
    }

    #[test]
    fn huge_page_numbers_saturate() {
        let page = Page::new(Some(i64::MAX), Some(100), 10);
        assert_eq!(page.skip(), i64::MAX as u64);
        assert!(page.skip() as i64 > 0);
    }
}
