//! Append-only conversation turn log.

use tokio_rusqlite::Connection;

use crate::core::errors::AppResult;
use crate::core::ids::{TurnId, UserId};
use crate::core::models::{ConversationTurn, Role};
use crate::storage::millis_to_datetime;

/// Store for conversation turns. Turns are immutable once appended; the
/// only mutation is clearing the whole history of one owner.
#[derive(Clone)]
pub struct TurnStore {
    conn: Connection,
}

type TurnRow = (
    TurnId,
    UserId,
    Role,
    String,
    Option<String>,
    Option<String>,
    i64,
);

fn row_to_turn(row: TurnRow) -> tokio_rusqlite::Result<ConversationTurn> {
    let (id, owner, role, content, tool_calls, metadata, created_at) = row;
    let tool_calls = match tool_calls {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?,
        None => Vec::new(),
    };
    let metadata = match metadata {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?,
        None => std::collections::HashMap::new(),
    };
    Ok(ConversationTurn {
        id,
        owner,
        role,
        content,
        tool_calls,
        metadata,
        created_at: millis_to_datetime(created_at)?,
    })
}

impl TurnStore {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Append one turn to the owner's history.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn append(&self, turn: &ConversationTurn) -> AppResult<()> {
        let turn = turn.clone();
        self.conn
            .call(move |conn| {
                let tool_calls = if turn.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        serde_json::to_string(&turn.tool_calls)
                            .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?,
                    )
                };
                let metadata = if turn.metadata.is_empty() {
                    None
                } else {
                    Some(
                        serde_json::to_string(&turn.metadata)
                            .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?,
                    )
                };
                conn.execute(
                    "INSERT INTO turns (id, owner, role, content, tool_calls, metadata, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        turn.id,
                        turn.owner,
                        turn.role,
                        turn.content,
                        tool_calls,
                        metadata,
                        turn.created_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// The most recent `limit` turns for `owner`, returned oldest first.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn recent(&self, owner: UserId, limit: usize) -> AppResult<Vec<ConversationTurn>> {
        let turns = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, owner, role, content, tool_calls, metadata, created_at
                     FROM turns WHERE owner = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![owner, limit as i64], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                        ))
                    })?
                    .collect::<Result<Vec<TurnRow>, _>>()?;

                let mut turns = rows
                    .into_iter()
                    .map(row_to_turn)
                    .collect::<tokio_rusqlite::Result<Vec<_>>>()?;
                turns.reverse();
                Ok(turns)
            })
            .await?;
        Ok(turns)
    }

    /// Delete every turn owned by `owner`. Clearing an empty history is a
    /// no-op, not an error.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn clear(&self, owner: UserId) -> AppResult<u64> {
        let removed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM turns WHERE owner = ?1",
                    rusqlite::params![owner],
                )?;
                Ok(u64::try_from(n).unwrap_or(0))
            })
            .await?;
        Ok(removed)
    }

    /// Number of turns owned by `owner`.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn count(&self, owner: UserId) -> AppResult<u64> {
        let count = self
            .conn
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM turns WHERE owner = ?1",
                    rusqlite::params![owner],
                    |row| row.get(0),
                )?;
                Ok(u64::try_from(n).unwrap_or(0))
            })
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{FunctionCall, ToolCallRecord};

    async fn store() -> (crate::storage::Storage, TurnStore) {
        let storage = crate::storage::Storage::open_in_memory().await.unwrap();
        let turns = storage.turns();
        (storage, turns)
    }

    #[tokio::test]
    async fn recent_returns_tail_oldest_first() {
        let (_storage, turns) = store().await;
        let owner = UserId::new();

        for i in 0..5 {
            let mut turn = ConversationTurn::new(owner, Role::User, format!("m{i}"));
            // Force distinct, increasing timestamps.
            turn.created_at += chrono::Duration::milliseconds(i);
            turns.append(&turn).await.unwrap();
        }

        let tail = turns.recent(owner, 3).await.unwrap();
        let contents: Vec<_> = tail.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let (_storage, turns) = store().await;
        let owner = UserId::new();
        turns
            .append(&ConversationTurn::new(owner, Role::User, "hello"))
            .await
            .unwrap();

        assert_eq!(turns.clear(owner).await.unwrap(), 1);
        assert_eq!(turns.count(owner).await.unwrap(), 0);
        // Second clear removes nothing and does not fail.
        assert_eq!(turns.clear(owner).await.unwrap(), 0);
        assert_eq!(turns.count(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn tool_call_records_round_trip() {
        let (_storage, turns) = store().await;
        let owner = UserId::new();

        let record = ToolCallRecord {
            id: "call_1".to_string(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: "create_task".to_string(),
                arguments: "{\"title\":\"Buy groceries\"}".to_string(),
            },
        };
        let turn = ConversationTurn::new(owner, Role::Assistant, "")
            .with_tool_calls(vec![record.clone()])
            .with_metadata("functionName", "create_task");
        turns.append(&turn).await.unwrap();

        let stored = turns.recent(owner, 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].tool_calls, vec![record]);
        assert_eq!(
            stored[0].metadata.get("functionName").map(String::as_str),
            Some("create_task")
        );
    }

    #[tokio::test]
    async fn empty_history_reads_as_empty_sequence() {
        let (_storage, turns) = store().await;
        assert!(turns.recent(UserId::new(), 50).await.unwrap().is_empty());
    }
}
