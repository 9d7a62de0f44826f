//! Catalog store: books and their availability counters

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{is_check_violation, is_unique_violation, AppError, AppResult},
    models::book::{Book, BookQuery, CreateBook, UpdateBook},
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Get book by ISBN
    pub async fn get_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE isbn = $1")
            .bind(isbn)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    /// Search active books; returns the page and the total match count
    pub async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let pattern = query
            .q
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .map(|q| format!("%{}%", q.trim()));
        let available_only = query.available_only.unwrap_or(false);

        let filter = r#"
            WHERE is_active
              AND ($1::text IS NULL OR title ILIKE $1 OR author ILIKE $1 OR isbn ILIKE $1)
              AND ($2::text IS NULL OR category = $2)
              AND ($3::text IS NULL OR department = $3)
              AND (NOT $4 OR available_copies > 0)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM books {}", filter))
            .bind(&pattern)
            .bind(&query.category)
            .bind(&query.department)
            .bind(available_only)
            .fetch_one(&self.pool)
            .await?;

        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT * FROM books {} ORDER BY title, id LIMIT $5 OFFSET $6",
            filter
        ))
        .bind(&pattern)
        .bind(&query.category)
        .bind(&query.department)
        .bind(available_only)
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((books, total))
    }

    /// Create a new book; every copy starts out available
    pub async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (
                isbn, title, author, publisher, publication_year, category,
                department, language, shelf_location, description,
                total_copies, available_copies
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING *
            "#,
        )
        .bind(&book.isbn)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.publisher)
        .bind(book.publication_year)
        .bind(&book.category)
        .bind(&book.department)
        .bind(&book.language)
        .bind(&book.shelf_location)
        .bind(&book.description)
        .bind(book.total_copies)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("A book with ISBN {} already exists", book.isbn))
            } else {
                e.into()
            }
        })
    }

    /// Lock a book row for the rest of the transaction
    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Apply an edit; `total_copies`/`available_copies` are precomputed by the caller
    pub async fn update(
        &self,
        conn: &mut PgConnection,
        id: i32,
        update: &UpdateBook,
        total_copies: i32,
        available_copies: i32,
    ) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                publisher = COALESCE($4, publisher),
                publication_year = COALESCE($5, publication_year),
                category = COALESCE($6, category),
                department = COALESCE($7, department),
                language = COALESCE($8, language),
                shelf_location = COALESCE($9, shelf_location),
                description = COALESCE($10, description),
                total_copies = $11,
                available_copies = $12,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.title)
        .bind(&update.author)
        .bind(&update.publisher)
        .bind(update.publication_year)
        .bind(&update.category)
        .bind(&update.department)
        .bind(&update.language)
        .bind(&update.shelf_location)
        .bind(&update.description)
        .bind(total_copies)
        .bind(available_copies)
        .fetch_one(&mut *conn)
        .await
        .map_err(integrity_or_db)
    }

    /// Take one copy off the shelf. Only succeeds while a copy is left, so
    /// concurrent borrowers of the last copy cannot both pass.
    pub async fn decrement_available(&self, conn: &mut PgConnection, id: i32) -> AppResult<bool> {
        let rows = sqlx::query(
            r#"
            UPDATE books SET available_copies = available_copies - 1, updated_at = NOW()
            WHERE id = $1 AND available_copies > 0
            "#,
        )
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(integrity_or_db)?
        .rows_affected();

        Ok(rows == 1)
    }

    /// Put one copy back on the shelf
    pub async fn increment_available(&self, conn: &mut PgConnection, id: i32) -> AppResult<()> {
        let rows = sqlx::query(
            r#"
            UPDATE books SET available_copies = available_copies + 1, updated_at = NOW()
            WHERE id = $1 AND available_copies < total_copies
            "#,
        )
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(integrity_or_db)?
        .rows_affected();

        if rows != 1 {
            return Err(AppError::Integrity(format!(
                "book {} would exceed its total copies",
                id
            )));
        }
        Ok(())
    }

    /// True once any borrowing or reservation points at the book
    pub async fn is_referenced(&self, id: i32) -> AppResult<bool> {
        let referenced: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM borrowings WHERE book_id = $1)
                OR EXISTS(SELECT 1 FROM reservations WHERE book_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(referenced)
    }

    pub async fn deactivate(&self, id: i32) -> AppResult<()> {
        sqlx::query("UPDATE books SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// A CHECK violation on the copies constraint means a lost update slipped
/// past the locks; report it as an integrity failure, never as a count.
fn integrity_or_db(e: sqlx::Error) -> AppError {
    if is_check_violation(&e) {
        AppError::Integrity(format!("books copies constraint: {}", e))
    } else {
        e.into()
    }
}
