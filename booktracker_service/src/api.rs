use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Serialize};

pub type BookId = i32;
pub type UserId = i32;

#[derive(
    Debug, Default, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Apiv2Schema,
)]
#[serde(rename_all = "snake_case")]
/// Reading progress of a book
pub enum Status {
    #[default]
    ToRead,
    Reading,
    Read,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::ToRead => "to_read",
            Status::Reading => "reading",
            Status::Read => "read",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "to_read" => Ok(Status::ToRead),
            "reading" => Ok(Status::Reading),
            "read" => Ok(Status::Read),
            other => Err(format!("Unknown status {other}")),
        }
    }
}

#[derive(
    Debug, Default, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Apiv2Schema,
)]
#[serde(rename_all = "snake_case")]
/// Status used to narrow a list of books, `all` matches every book
pub enum StatusFilter {
    #[default]
    All,
    ToRead,
    Reading,
    Read,
}

impl StatusFilter {
    pub fn status(&self) -> Option<Status> {
        match self {
            StatusFilter::All => None,
            StatusFilter::ToRead => Some(Status::ToRead),
            StatusFilter::Reading => Some(Status::Reading),
            StatusFilter::Read => Some(Status::Read),
        }
    }

    pub fn matches(&self, status: Status) -> bool {
        self.status().map_or(true, |wanted| wanted == status)
    }
}

impl From<Status> for StatusFilter {
    fn from(status: Status) -> Self {
        match status {
            Status::ToRead => StatusFilter::ToRead,
            Status::Reading => StatusFilter::Reading,
            Status::Read => StatusFilter::Read,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
/// Book as stored in the user's library
pub struct Book {
    pub id: BookId,
    pub user_id: UserId,
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub status: Status,
    pub total_pages: Option<u32>,
    pub current_page: Option<u32>,
    pub rating: Option<f64>,
    pub premise: Option<String>,
    pub review: Option<String>,
    pub cover_path: Option<String>,
    pub pdf_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
/// Body of book create and update requests.
/// Fields that are not relevant for the status are left out when serialized.
pub struct BookPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premise: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct BooksQuery {
    pub status: Option<StatusFilter>,
}

/// File extension, dot included, used when storing an upload of this content type
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "application/pdf" => ".pdf",
        _ => ".bin",
    }
}

pub fn content_type_for(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, extension)| extension) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
/// File attached to a book, served by dedicated endpoints
pub enum AttachmentKind {
    Cover,
    Pdf,
}

impl AttachmentKind {
    /// Name of the multipart field carrying the file
    pub fn field_name(&self) -> &'static str {
        match self {
            AttachmentKind::Cover => "cover",
            AttachmentKind::Pdf => "pdf",
        }
    }

    pub fn accepts(&self, content_type: &str) -> bool {
        match self {
            AttachmentKind::Cover => content_type.starts_with("image/"),
            AttachmentKind::Pdf => content_type == "application/pdf",
        }
    }

    pub fn path_of<'a>(&self, book: &'a Book) -> Option<&'a str> {
        match self {
            AttachmentKind::Cover => book.cover_path.as_deref(),
            AttachmentKind::Pdf => book.pdf_path.as_deref(),
        }
    }

    pub fn missing_message(&self) -> &'static str {
        match self {
            AttachmentKind::Cover => "No cover available",
            AttachmentKind::Pdf => "No PDF available",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Public part of the user account
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Profile change, only provided fields are updated
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct ErrorResponse {
    pub error: String,
}
