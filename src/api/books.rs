//! Catalog endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookQuery, CreateBook, UpdateBook},
        reservation::Reservation,
    },
    AppState,
};

/// One page of search results
#[derive(Serialize, ToSchema)]
pub struct BookPage {
    pub books: Vec<Book>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteBookResponse {
    /// False when the book was only deactivated because loans refer to it
    pub deleted: bool,
}

/// Search the catalog
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    params(BookQuery),
    responses(
        (status = 200, description = "Matching books", body = BookPage)
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<BookPage>> {
    let (books, total) = state.services.catalog.search_books(&query).await?;
    Ok(Json(BookPage {
        books,
        total,
        page: query.page.unwrap_or(1).max(1),
        per_page: query.limit(),
    }))
}

/// Get a book
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(State(state): State<AppState>, Path(id): Path<i32>) -> AppResult<Json<Book>> {
    Ok(Json(state.services.catalog.get_book(id).await?))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid book"),
        (status = 409, description = "ISBN already exists")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    Json(book): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let book = state.services.catalog.create_book(book).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Edit a book, optionally resizing its stock
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Book ID")),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Stock smaller than copies on loan"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(update): Json<UpdateBook>,
) -> AppResult<Json<Book>> {
    Ok(Json(state.services.catalog.update_book(id, update).await?))
}

/// Delete a book, or deactivate it once loans refer to it
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book removed or deactivated", body = DeleteBookResponse),
        (status = 404, description = "Book not found")
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<DeleteBookResponse>> {
    let deleted = state.services.catalog.delete_book(id).await?;
    Ok(Json(DeleteBookResponse { deleted }))
}

/// Pending reservation queue of a book, first in line first
#[utoipa::path(
    get,
    path = "/books/{id}/reservations",
    tag = "reservations",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Pending reservations", body = Vec<Reservation>),
        (status = 404, description = "Book not found")
    )
)]
pub async fn book_queue(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<Reservation>>> {
    Ok(Json(state.services.reservations.queue(id).await?))
}
