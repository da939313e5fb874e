use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PER_PAGE: u64 = 20;
pub const MAX_PER_PAGE: u64 = 100;

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    #[schema(example = 1)]
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    #[schema(example = 20)]
    /// Items per page, at most 100
    pub per_page: Option<u64>,
}

impl PageQuery {
    /// (page, per_page, offset) with page clamped to 1.. and per_page to 1..=100.
    pub fn resolve(&self) -> (u64, u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        (page, per_page, (page - 1) * per_page)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[aliases(
    AttendancePage = Paginated<crate::model::attendance::Attendance>,
    LeavePage = Paginated<crate::model::request::LeaveRequest>,
    OvertimePage = Paginated<crate::model::request::OvertimeRequest>,
    LatePage = Paginated<crate::model::request::LateRequest>
)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 20)]
    pub per_page: u64,
    #[schema(example = 57)]
    pub total: i64,
    #[schema(example = 3)]
    pub total_pages: u64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, page: u64, per_page: u64, total: i64) -> Self {
        let total_pages = (total.max(0) as u64).div_ceil(per_page.max(1));
        Paginated { data, page, per_page, total, total_pages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_defaults_and_clamps() {
        assert_eq!(PageQuery::default().resolve(), (1, 20, 0));
        let q = PageQuery { page: Some(0), per_page: Some(1000) };
        assert_eq!(q.resolve(), (1, 100, 0));
        let q = PageQuery { page: Some(3), per_page: Some(10) };
        assert_eq!(q.resolve(), (3, 10, 20));
    }

    #[test]
    fn counts_pages() {
        assert_eq!(Paginated::<u8>::new(vec![], 1, 20, 0).total_pages, 0);
        assert_eq!(Paginated::<u8>::new(vec![], 1, 20, 41).total_pages, 3);
    }
}
