//! Validation of the add/edit book form.
//!
//! A [`BookForm`] holds raw user input. [`BookForm::validate`] checks it and
//! builds a [`NewBook`] whose [`Progress`] only carries the fields that make
//! sense for the chosen status.

use crate::api::{Book, BookPayload, Status};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookFormError {
    #[error("Title and author are required")]
    MissingTitleOrAuthor,

    #[error("Total pages is required and must be > 0 when status is Reading")]
    InvalidTotalPages,

    #[error("Current page is required and must be >= 0 when status is Reading")]
    InvalidCurrentPage,

    #[error("Current page cannot be greater than total pages")]
    CurrentPageExceedsTotal,

    #[error("Rating must be between 0 and 5")]
    RatingOutOfRange,

    #[error("Total pages must be >= 1")]
    TotalPagesTooSmall,
}

#[derive(Debug, Default, Clone, PartialEq)]
/// Raw values of the book form, numbers are `None` when the input is empty
pub struct BookForm {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub status: Status,
    pub total_pages: Option<i64>,
    pub current_page: Option<i64>,
    pub rating: Option<f64>,
    pub premise: String,
    pub review: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    ToRead,
    Reading {
        total_pages: u32,
        current_page: u32,
    },
    Read {
        rating: Option<f64>,
        total_pages: Option<u32>,
    },
}

impl Progress {
    pub fn status(&self) -> Status {
        match self {
            Progress::ToRead => Status::ToRead,
            Progress::Reading { .. } => Status::Reading,
            Progress::Read { .. } => Status::Read,
        }
    }

    pub fn total_pages(&self) -> Option<u32> {
        match self {
            Progress::ToRead => None,
            Progress::Reading { total_pages, .. } => Some(*total_pages),
            Progress::Read { total_pages, .. } => *total_pages,
        }
    }

    pub fn current_page(&self) -> Option<u32> {
        match self {
            Progress::Reading { current_page, .. } => Some(*current_page),
            _ => None,
        }
    }

    pub fn rating(&self) -> Option<f64> {
        match self {
            Progress::Read { rating, .. } => *rating,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Validated book ready to be created or to replace an existing one
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub premise: Option<String>,
    pub review: Option<String>,
    pub progress: Progress,
}

impl NewBook {
    pub fn status(&self) -> Status {
        self.progress.status()
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl BookForm {
    /// Checks the form and builds the book, the first failing rule is returned
    pub fn validate(&self) -> Result<NewBook, BookFormError> {
        let title = self.title.trim();
        let author = self.author.trim();
        if title.is_empty() || author.is_empty() {
            return Err(BookFormError::MissingTitleOrAuthor);
        }

        let progress = match self.status {
            Status::ToRead => Progress::ToRead,
            Status::Reading => {
                let total_pages = self
                    .total_pages
                    .filter(|pages| *pages > 0)
                    .and_then(|pages| u32::try_from(pages).ok())
                    .ok_or(BookFormError::InvalidTotalPages)?;
                let current_page = self
                    .current_page
                    .filter(|page| *page >= 0)
                    .ok_or(BookFormError::InvalidCurrentPage)?;
                if current_page > i64::from(total_pages) {
                    return Err(BookFormError::CurrentPageExceedsTotal);
                }
                Progress::Reading {
                    total_pages,
                    // bounded by total_pages above
                    current_page: current_page as u32,
                }
            }
            Status::Read => {
                if let Some(rating) = self.rating {
                    if !(0.0..=5.0).contains(&rating) {
                        return Err(BookFormError::RatingOutOfRange);
                    }
                }
                let total_pages = match self.total_pages {
                    None => None,
                    Some(pages) => Some(
                        u32::try_from(pages)
                            .ok()
                            .filter(|pages| *pages > 0)
                            .ok_or(BookFormError::TotalPagesTooSmall)?,
                    ),
                };
                Progress::Read {
                    rating: self.rating,
                    total_pages,
                }
            }
        };

        Ok(NewBook {
            title: title.to_string(),
            author: author.to_string(),
            genre: non_empty(&self.genre),
            premise: non_empty(&self.premise),
            review: non_empty(&self.review),
            progress,
        })
    }
}

impl From<BookPayload> for BookForm {
    fn from(payload: BookPayload) -> Self {
        Self {
            title: payload.title,
            author: payload.author,
            genre: payload.genre.unwrap_or_default(),
            status: payload.status,
            total_pages: payload.total_pages,
            current_page: payload.current_page,
            rating: payload.rating,
            premise: payload.premise.unwrap_or_default(),
            review: payload.review.unwrap_or_default(),
        }
    }
}

impl From<&Book> for BookForm {
    fn from(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            genre: book.genre.clone().unwrap_or_default(),
            status: book.status,
            total_pages: book.total_pages.map(i64::from),
            current_page: book.current_page.map(i64::from),
            rating: book.rating,
            premise: book.premise.clone().unwrap_or_default(),
            review: book.review.clone().unwrap_or_default(),
        }
    }
}

impl TryFrom<BookPayload> for NewBook {
    type Error = BookFormError;

    fn try_from(payload: BookPayload) -> Result<Self, Self::Error> {
        BookForm::from(payload).validate()
    }
}

impl From<&NewBook> for BookPayload {
    fn from(book: &NewBook) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            status: book.status(),
            genre: book.genre.clone(),
            total_pages: book.progress.total_pages().map(i64::from),
            current_page: book.progress.current_page().map(i64::from),
            rating: book.progress.rating(),
            premise: book.premise.clone(),
            review: book.review.clone(),
        }
    }
}
