//! Owner-scoped note persistence.

use tokio_rusqlite::Connection;

use crate::core::errors::AppResult;
use crate::core::ids::{NoteId, UserId};
use crate::core::models::Note;
use crate::storage::millis_to_datetime;

/// Store for notes. Every query is filtered by the owning user.
#[derive(Clone)]
pub struct NoteStore {
    conn: Connection,
}

type NoteRow = (NoteId, UserId, String, String, i64, i64);

fn row_to_note(row: NoteRow) -> tokio_rusqlite::Result<Note> {
    let (id, owner, title, content, created_at, updated_at) = row;
    Ok(Note {
        id,
        owner,
        title,
        content,
        created_at: millis_to_datetime(created_at)?,
        updated_at: millis_to_datetime(updated_at)?,
    })
}

impl NoteStore {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Persist a new note.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn insert(&self, note: &Note) -> AppResult<()> {
        let note = note.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO notes (id, owner, title, content, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        note.id,
                        note.owner,
                        note.title,
                        note.content,
                        note.created_at.timestamp_millis(),
                        note.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// All notes owned by `owner`, newest first.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn list(&self, owner: UserId) -> AppResult<Vec<Note>> {
        let notes = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, owner, title, content, created_at, updated_at
                     FROM notes WHERE owner = ?1
                     ORDER BY created_at DESC, id DESC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![owner], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    })?
                    .collect::<Result<Vec<NoteRow>, _>>()?;

                rows.into_iter().map(row_to_note).collect()
            })
            .await?;
        Ok(notes)
    }

    /// Fetch one note if it exists and belongs to `owner`.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn get(&self, id: NoteId, owner: UserId) -> AppResult<Option<Note>> {
        let note = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, owner, title, content, created_at, updated_at
                         FROM notes WHERE id = ?1 AND owner = ?2",
                        rusqlite::params![id, owner],
                        |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                                row.get(5)?,
                            ))
                        },
                    )
                    .ok();

                row.map(row_to_note).transpose()
            })
            .await?;
        Ok(note)
    }

    /// Overwrite the mutable fields of a note owned by `owner`.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn update(&self, note: &Note) -> AppResult<()> {
        let note = note.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE notes SET title = ?3, content = ?4, updated_at = ?5
                     WHERE id = ?1 AND owner = ?2",
                    rusqlite::params![
                        note.id,
                        note.owner,
                        note.title,
                        note.content,
                        note.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Delete a note owned by `owner`. Returns whether a row was removed.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn delete(&self, id: NoteId, owner: UserId) -> AppResult<bool> {
        let removed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM notes WHERE id = ?1 AND owner = ?2",
                    rusqlite::params![id, owner],
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(removed)
    }

    /// Number of notes owned by `owner`.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn count(&self, owner: UserId) -> AppResult<u64> {
        let count = self
            .conn
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM notes WHERE owner = ?1",
                    rusqlite::params![owner],
                    |row| row.get(0),
                )?;
                Ok(u64::try_from(n).unwrap_or(0))
            })
            .await?;
        Ok(count)
    }
}
