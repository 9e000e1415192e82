/// Offset and limits accumulated on a row query.
///
/// Offsets add up; when several limits are installed on one side the
/// smallest wins. `limit` caps the window read forward from the offset and
/// `last` keeps only the trailing rows of that window.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct PageWindow {
    offset: Option<u64>,
    limit: Option<u64>,
    last: Option<u64>,
}

impl PageWindow {
    pub fn with_limit(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn add_offset(&mut self, offset: u64) {
        self.offset = Some(self.offset.unwrap_or_default().saturating_add(offset));
    }

    pub fn limit(&mut self, limit: u64) {
        self.limit = Some(min_with(self.limit, limit));
    }

    pub fn keep_last(&mut self, count: u64) {
        self.last = Some(min_with(self.last, count));
    }

    pub fn final_offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn final_limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn final_last(&self) -> Option<u64> {
        self.last
    }

    pub fn has_zero_limit(&self) -> bool {
        self.limit == Some(0) || self.last == Some(0)
    }
}

fn min_with(current: Option<u64>, value: u64) -> u64 {
    current.map_or(value, |current| current.min(value))
}

/// Limit that makes a page stop right before natural row `position`,
/// given the offset already applied.
pub fn natural_limit_before(position: u64, offset: u64) -> u64 {
    position.saturating_sub(offset).saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_add_and_smallest_limit_wins() {
        let mut window = PageWindow::with_limit(10);
        window.add_offset(3);
        window.add_offset(4);
        window.limit(20);
        window.limit(6);
        assert_eq!(window.final_offset(), Some(7));
        assert_eq!(window.final_limit(), Some(6));
        assert!(!window.has_zero_limit());
    }

    #[test]
    fn trailing_count_is_kept_apart_from_limit() {
        let mut window = PageWindow::default();
        window.keep_last(5);
        window.keep_last(8);
        assert_eq!(window.final_last(), Some(5));
        assert_eq!(window.final_limit(), None);

        window.keep_last(0);
        assert!(window.has_zero_limit());
    }

    #[test]
    fn natural_limit_stops_before_position() {
        assert_eq!(natural_limit_before(12, 5), 6);
        assert_eq!(natural_limit_before(1, 0), 0);
        assert_eq!(natural_limit_before(3, 10), 0);
    }
}
