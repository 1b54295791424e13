use anyhow::{bail, Context};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;

use crate::api::{
    extension_for, AttachmentKind, Book, BookId, BookPayload, ErrorResponse, LoginRequest,
    LoginResponse, RegisterRequest, StatusFilter, User, UserPatch,
};
use crate::book_form::{BookForm, BookFormError};
use crate::preview::PreviewSlot;
use crate::stats::LibraryStats;

/// Token of a logged in user, passed to every authenticated call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// File picked for upload together with a book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachments {
    pub pdf: Option<Attachment>,
    pub cover: Option<Attachment>,
}

#[derive(Debug)]
pub struct AttachmentFailure {
    pub kind: AttachmentKind,
    pub error: anyhow::Error,
}

/// Result of a form submission.
/// The book is saved even when some of its attachments were rejected.
#[derive(Debug)]
pub struct BookSubmission {
    pub book: Book,
    pub attachment_failures: Vec<AttachmentFailure>,
}

#[derive(thiserror::Error, Debug)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] BookFormError),

    #[error("{0:#}")]
    Api(anyhow::Error),
}

struct DownloadedFile {
    content_type: String,
    bytes: Vec<u8>,
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(error) => error.error,
        Err(_) => status.to_string(),
    }
}

pub struct BookTrackerClient {
    url: String,
    client: ClientWithMiddleware,
}

impl BookTrackerClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .build();

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Calls POST /auth/register endpoint
    pub async fn register(&self, request: &RegisterRequest) -> anyhow::Result<User> {
        let response = self
            .client
            .post(format!("{}/auth/register", self.url))
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to register {}", error_message(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls POST /auth/login endpoint
    pub async fn login(&self, email: &str, password: &str) -> anyhow::Result<Session> {
        let response = self
            .client
            .post(format!("{}/auth/login", self.url))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to log in {}", error_message(response).await)
        }
        let login: LoginResponse = response.json().await?;
        Ok(Session::new(login.token))
    }

    /// Calls GET /books/ endpoint, `StatusFilter::All` lists the whole library
    pub async fn list_books(
        &self,
        session: &Session,
        filter: StatusFilter,
    ) -> anyhow::Result<Vec<Book>> {
        let mut request = self
            .client
            .get(format!("{}/books/", self.url))
            .bearer_auth(session.token());
        if let Some(status) = filter.status() {
            request = request.query(&[("status", status.as_str())]);
        }
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            bail!("Failed to list books {}", error_message(response).await)
        }
    }

    /// Calls GET /books/{book_id} endpoint
    /// Returns None if the book does not exist in the user's library
    pub async fn get_book(&self, session: &Session, book_id: BookId) -> anyhow::Result<Option<Book>> {
        let response = self
            .client
            .get(format!("{}/books/{}", self.url, book_id))
            .bearer_auth(session.token())
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            bail!("Failed to get book {}", error_message(response).await)
        }
    }

    /// Calls POST /books/ endpoint
    pub async fn add_book(&self, session: &Session, payload: &BookPayload) -> anyhow::Result<Book> {
        let response = self
            .client
            .post(format!("{}/books/", self.url))
            .bearer_auth(session.token())
            .json(payload)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to add book {}", error_message(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls PUT /books/{book_id} endpoint
    pub async fn update_book(
        &self,
        session: &Session,
        book_id: BookId,
        payload: &BookPayload,
    ) -> anyhow::Result<Book> {
        let response = self
            .client
            .put(format!("{}/books/{}", self.url, book_id))
            .bearer_auth(session.token())
            .json(payload)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to update book {}", error_message(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls DELETE /books/{book_id} endpoint
    /// Returns false if there was no such book
    pub async fn delete_book(&self, session: &Session, book_id: BookId) -> anyhow::Result<bool> {
        let response = self
            .client
            .delete(format!("{}/books/{}", self.url, book_id))
            .bearer_auth(session.token())
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(false)
        } else if response.status().is_success() {
            Ok(true)
        } else {
            bail!("Failed to delete book {}", error_message(response).await)
        }
    }

    /// Calls PUT /books/{book_id}/cover or /books/{book_id}/pdf endpoint
    pub async fn upload_attachment(
        &self,
        session: &Session,
        book_id: BookId,
        attachment: &Attachment,
    ) -> anyhow::Result<Book> {
        let part = Part::bytes(attachment.bytes.clone())
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.content_type)
            .context("Invalid attachment content type")?;
        let form = Form::new().part(attachment.kind.field_name(), part);

        let response = self
            .client
            .put(format!("{}/books/{}/{}", self.url, book_id, attachment.kind))
            .bearer_auth(session.token())
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!(
                "Failed to upload {} {}",
                attachment.kind,
                error_message(response).await
            )
        }
        Ok(response.json().await?)
    }

    /// Calls GET /books/{book_id}/cover or /books/{book_id}/pdf endpoint
    /// Returns None when the book has no such attachment
    pub async fn download_attachment(
        &self,
        session: &Session,
        book_id: BookId,
        kind: AttachmentKind,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self
            .fetch_attachment(session, book_id, kind)
            .await?
            .map(|file| file.bytes))
    }

    async fn fetch_attachment(
        &self,
        session: &Session,
        book_id: BookId,
        kind: AttachmentKind,
    ) -> anyhow::Result<Option<DownloadedFile>> {
        let response = self
            .client
            .get(format!("{}/books/{}/{}", self.url, book_id, kind))
            .bearer_auth(session.token())
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(';').next())
                .map(|value| value.trim().to_string())
                .unwrap_or_default();
            let bytes = response.bytes().await?.to_vec();
            Ok(Some(DownloadedFile {
                content_type,
                bytes,
            }))
        } else {
            bail!("Failed to download {} {}", kind, error_message(response).await)
        }
    }

    /// Downloads the attachment into the preview slot, the file extension follows its content type.
    /// Returns false and closes the previous preview when there is nothing to show.
    pub async fn preview_attachment(
        &self,
        session: &Session,
        book_id: BookId,
        kind: AttachmentKind,
        slot: &mut PreviewSlot,
    ) -> anyhow::Result<bool> {
        let Some(file) = self.fetch_attachment(session, book_id, kind).await? else {
            slot.close();
            return Ok(false);
        };
        let extension = extension_for(&file.content_type).trim_start_matches('.');
        slot.show(&file.bytes, extension)
            .context("Failed to write preview file")?;
        Ok(true)
    }

    /// Calls GET /user/ endpoint
    pub async fn get_user(&self, session: &Session) -> anyhow::Result<User> {
        let response = self
            .client
            .get(format!("{}/user/", self.url))
            .bearer_auth(session.token())
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to get user {}", error_message(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls PUT /user/ endpoint
    pub async fn update_user(&self, session: &Session, patch: &UserPatch) -> anyhow::Result<User> {
        let response = self
            .client
            .put(format!("{}/user/", self.url))
            .bearer_auth(session.token())
            .json(patch)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to update user {}", error_message(response).await)
        }
        Ok(response.json().await?)
    }

    pub async fn library_stats(&self, session: &Session) -> anyhow::Result<LibraryStats> {
        let books = self.list_books(session, StatusFilter::All).await?;
        Ok(LibraryStats::from_books(&books))
    }

    /// Validates the form, creates the book and uploads the selected files
    pub async fn submit_book_form(
        &self,
        session: &Session,
        form: &BookForm,
        attachments: Attachments,
    ) -> Result<BookSubmission, SubmitError> {
        let payload = BookPayload::from(&form.validate()?);
        let book = self
            .add_book(session, &payload)
            .await
            .map_err(SubmitError::Api)?;
        Ok(self.upload_attachments(session, book, attachments).await)
    }

    /// Same flow as [`Self::submit_book_form`] for an existing book
    pub async fn update_book_form(
        &self,
        session: &Session,
        book_id: BookId,
        form: &BookForm,
        attachments: Attachments,
    ) -> Result<BookSubmission, SubmitError> {
        let payload = BookPayload::from(&form.validate()?);
        let book = self
            .update_book(session, book_id, &payload)
            .await
            .map_err(SubmitError::Api)?;
        Ok(self.upload_attachments(session, book, attachments).await)
    }

    async fn upload_attachments(
        &self,
        session: &Session,
        mut book: Book,
        attachments: Attachments,
    ) -> BookSubmission {
        let mut attachment_failures = Vec::new();
        for attachment in [attachments.pdf, attachments.cover].into_iter().flatten() {
            match self.upload_attachment(session, book.id, &attachment).await {
                Ok(updated) => book = updated,
                Err(error) => {
                    tracing::warn!(
                        "{} upload for book {} failed: {:#}",
                        attachment.kind,
                        book.id,
                        error
                    );
                    attachment_failures.push(AttachmentFailure {
                        kind: attachment.kind,
                        error,
                    });
                }
            }
        }
        BookSubmission {
            book,
            attachment_failures,
        }
    }
}

#[cfg(test)]
mod client_tests {
    use super::*;
    use crate::api::Status;
    use crate::app_config::test_server::{in_memory_state, spawn_test_server};

    async fn logged_in_client() -> (BookTrackerClient, Session) {
        let url = spawn_test_server(in_memory_state());
        let client = BookTrackerClient::new(&url).expect("Failed to create client");
        client
            .register(&RegisterRequest {
                username: "reader".to_string(),
                email: "reader@example.com".to_string(),
                password: "hunter2".to_string(),
            })
            .await
            .expect("Failed to register");
        let session = client
            .login("reader@example.com", "hunter2")
            .await
            .expect("Failed to log in");
        (client, session)
    }

    fn cover(content_type: &str) -> Attachment {
        Attachment {
            kind: AttachmentKind::Cover,
            file_name: "cover.png".to_string(),
            content_type: content_type.to_string(),
            bytes: b"cover bytes".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_invalid_form_is_not_sent() {
        let (client, session) = logged_in_client().await;
        let form = BookForm {
            title: "Dune".to_string(),
            author: "Herrera".to_string(),
            status: Status::Reading,
            total_pages: Some(400),
            current_page: Some(450),
            ..BookForm::default()
        };

        let result = client
            .submit_book_form(&session, &form, Attachments::default())
            .await;
        assert!(matches!(
            result,
            Err(SubmitError::Invalid(BookFormError::CurrentPageExceedsTotal))
        ));
        assert!(client
            .list_books(&session, StatusFilter::All)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_submit_with_attachments() {
        let (client, session) = logged_in_client().await;
        let form = BookForm {
            title: "Dune".to_string(),
            author: "Herrera".to_string(),
            status: Status::Read,
            rating: Some(4.5),
            ..BookForm::default()
        };
        let attachments = Attachments {
            pdf: Some(Attachment {
                kind: AttachmentKind::Pdf,
                file_name: "dune.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                bytes: b"%PDF-1.4".to_vec(),
            }),
            cover: Some(cover("image/png")),
        };

        let submission = client
            .submit_book_form(&session, &form, attachments)
            .await
            .expect("Failed to submit");
        assert!(submission.attachment_failures.is_empty());
        assert!(submission.book.pdf_path.is_some());
        assert!(submission.book.cover_path.is_some());

        let pdf = client
            .download_attachment(&session, submission.book.id, AttachmentKind::Pdf)
            .await
            .unwrap();
        assert_eq!(pdf, Some(b"%PDF-1.4".to_vec()));

        let mut slot = PreviewSlot::in_temp_dir();
        assert!(client
            .preview_attachment(&session, submission.book.id, AttachmentKind::Cover, &mut slot)
            .await
            .unwrap());
        let preview_path = slot.current().expect("No preview").to_path_buf();
        assert_eq!(
            preview_path.extension().and_then(|ext| ext.to_str()),
            Some("png")
        );
        assert_eq!(std::fs::read(&preview_path).unwrap(), b"cover bytes");
        drop(slot);
        assert!(!preview_path.exists());
    }

    #[tokio::test]
    async fn test_rejected_cover_keeps_book() {
        let (client, session) = logged_in_client().await;
        let form = BookForm {
            title: "Dune".to_string(),
            author: "Herbert".to_string(),
            ..BookForm::default()
        };
        let attachments = Attachments {
            cover: Some(cover("text/plain")),
            ..Attachments::default()
        };

        let submission = client
            .submit_book_form(&session, &form, attachments)
            .await
            .expect("Failed to submit");
        assert_eq!(submission.attachment_failures.len(), 1);
        assert_eq!(
            submission.attachment_failures[0].kind,
            AttachmentKind::Cover
        );
        assert!(submission.book.cover_path.is_none());

        let stored = client
            .get_book(&session, submission.book.id)
            .await
            .unwrap()
            .expect("Book not found");
        assert_eq!(stored.title, "Dune");
        assert_eq!(
            client
                .download_attachment(&session, stored.id, AttachmentKind::Cover)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_update_stats_and_profile() {
        let (client, session) = logged_in_client().await;
        for (title, status) in [
            ("Dune", Status::ToRead),
            ("Emma", Status::ToRead),
            ("Ulysses", Status::Read),
        ] {
            let payload = BookPayload {
                title: title.to_string(),
                author: "Someone".to_string(),
                status,
                ..BookPayload::default()
            };
            client.add_book(&session, &payload).await.unwrap();
        }

        let to_read = client
            .list_books(&session, StatusFilter::ToRead)
            .await
            .unwrap();
        assert_eq!(to_read.len(), 2);

        let form = BookForm {
            status: Status::Reading,
            total_pages: Some(300),
            current_page: Some(10),
            ..BookForm::from(&to_read[0])
        };
        let submission = client
            .update_book_form(&session, to_read[0].id, &form, Attachments::default())
            .await
            .expect("Failed to update");
        assert_eq!(submission.book.current_page, Some(10));

        let stats = client.library_stats(&session).await.unwrap();
        assert_eq!(
            stats,
            LibraryStats {
                to_read: 1,
                reading: 1,
                read: 1,
                total: 3
            }
        );

        let user = client
            .update_user(
                &session,
                &UserPatch {
                    username: Some("bookworm".to_string()),
                    email: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(user.username, "bookworm");
        assert_eq!(client.get_user(&session).await.unwrap(), user);

        assert!(client.delete_book(&session, to_read[1].id).await.unwrap());
        assert!(!client.delete_book(&session, to_read[1].id).await.unwrap());
        assert!(client.get_book(&session, to_read[1].id).await.unwrap().is_none());

        let wrong_session = Session::new("garbage");
        let err = client
            .list_books(&wrong_session, StatusFilter::All)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid token"));
    }
}
