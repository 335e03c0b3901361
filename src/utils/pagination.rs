use serde::Deserialize;
use utoipa::IntoParams;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Default, Clone, Copy, Deserialize, IntoParams)]
pub struct PageParams {
    /// 1-based page number
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

impl PageParams {
    pub fn resolve(&self) -> Page {
        Page {
            page: self.page.unwrap_or(1).max(1),
            per_page: self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamps() {
        let p = PageParams::default().resolve();
        assert_eq!(p, Page { page: 1, per_page: DEFAULT_PER_PAGE });
        assert_eq!(p.offset(), 0);

        let p = PageParams { page: Some(0), per_page: Some(1_000) }.resolve();
        assert_eq!(p, Page { page: 1, per_page: MAX_PER_PAGE });

        let p = PageParams { page: Some(3), per_page: Some(25) }.resolve();
        assert_eq!(p.offset(), 50);
        assert_eq!(p.limit(), 25);
    }
}
