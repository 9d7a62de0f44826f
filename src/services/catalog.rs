//! Catalog management service

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookQuery, CreateBook, UpdateBook},
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Search books with filters
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        self.repository.books.search(query).await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    /// Create a new book; all copies start on the shelf
    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;
        if let Some(existing) = self.repository.books.get_by_isbn(&book.isbn).await? {
            return Err(AppError::Conflict(format!(
                "ISBN {} already belongs to book {}",
                book.isbn, existing.id
            )));
        }

        let created = self.repository.books.create(&book).await?;
        tracing::info!(book_id = created.id, isbn = %created.isbn, "Book created");
        Ok(created)
    }

    /// Edit a book. Resizing the stock moves availability by the same delta
    /// and is refused if it would leave fewer copies than are on loan.
    pub async fn update_book(&self, id: i32, update: UpdateBook) -> AppResult<Book> {
        update.validate()?;

        let mut tx = self.repository.begin().await?;
        let book = self.repository.books.lock(&mut tx, id).await?;

        let total = update.total_copies.unwrap_or(book.total_copies);
        let available = book.resized_availability(total).ok_or_else(|| {
            AppError::Validation(format!(
                "Cannot reduce stock to {} while {} copies are on loan",
                total,
                book.loaned_copies()
            ))
        })?;

        let updated = self
            .repository
            .books
            .update(&mut tx, id, &update, total, available)
            .await?;
        tx.commit().await?;

        if total != book.total_copies {
            tracing::info!(
                book_id = id,
                total_copies = total,
                available_copies = available,
                "Book stock resized"
            );
        }
        Ok(updated)
    }

    /// Hard delete a book nothing refers to, otherwise deactivate it.
    /// Returns true when the row was removed.
    pub async fn delete_book(&self, id: i32) -> AppResult<bool> {
        self.repository.books.get_by_id(id).await?;

        if self.repository.books.is_referenced(id).await? {
            self.repository.books.deactivate(id).await?;
            tracing::info!(book_id = id, "Book deactivated");
            Ok(false)
        } else {
            self.repository.books.delete(id).await?;
            tracing::info!(book_id = id, "Book deleted");
            Ok(true)
        }
    }
}
