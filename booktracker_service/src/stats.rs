use serde::{Deserialize, Serialize};

use crate::api::{Book, Status};

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
/// Number of books per status in a library
pub struct LibraryStats {
    pub to_read: usize,
    pub reading: usize,
    pub read: usize,
    pub total: usize,
}

impl LibraryStats {
    pub fn from_books<'a>(books: impl IntoIterator<Item = &'a Book>) -> Self {
        books
            .into_iter()
            .fold(LibraryStats::default(), |mut stats, book| {
                match book.status {
                    Status::ToRead => stats.to_read += 1,
                    Status::Reading => stats.reading += 1,
                    Status::Read => stats.read += 1,
                }
                stats.total += 1;
                stats
            })
    }
}

#[cfg(test)]
mod stats_tests {
    use chrono::Utc;

    use super::*;
    use crate::api::StatusFilter;

    fn book(id: i32, status: Status) -> Book {
        Book {
            id,
            user_id: 1,
            title: format!("title{id}"),
            author: "author".to_string(),
            genre: None,
            status,
            total_pages: None,
            current_page: None,
            rating: None,
            premise: None,
            review: None,
            cover_path: None,
            pdf_path: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_counts_per_status() {
        let books = vec![
            book(1, Status::Read),
            book(2, Status::ToRead),
            book(3, Status::Read),
            book(4, Status::Reading),
        ];

        let stats = LibraryStats::from_books(&books);
        assert_eq!(
            stats,
            LibraryStats {
                to_read: 1,
                reading: 1,
                read: 2,
                total: 4,
            }
        );
        assert_eq!(
            LibraryStats::from_books(Vec::<Book>::new().iter()),
            LibraryStats::default()
        );
    }

    #[test]
    fn test_filter_parses_all() {
        let filter: StatusFilter = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(filter, StatusFilter::All);
        assert!(filter.matches(Status::Reading));
        assert!(!StatusFilter::from(Status::Read).matches(Status::ToRead));
    }
}
