//! Atomic writer for the friend graph.
//!
//! A friendship mutation touches friendship rows, the chat room status pair,
//! friend requests and blocks together. Callers describe the mutation as a
//! list of [`RelationWrite`]s and [`RelationRepository::apply`] runs them in
//! one transaction.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{
    Blocking, ChatRoom, FriendRequest, Friendship, blocking, chat_room, chat_room::ChatStatus,
    friend_request, friend_request::FriendRequestStatus, friendship,
};
use chrono::Utc;
use coterie_common::{AppResult, IdGenerator, chat_room_id, friend_request_id, sorted_pair};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, Set,
    TransactionTrait, sea_query::OnConflict,
};
use tracing::debug;

/// One write in a friend-graph batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationWrite {
    /// Friendship rows in both directions.
    AddFriendPair { a: String, b: String },
    /// Remove friendship rows in both directions.
    RemoveFriendPair { a: String, b: String },
    /// Create or overwrite the room status pair. `user_a < user_b`.
    PutChatRoom {
        user_a: String,
        user_b: String,
        status_a: ChatStatus,
        status_b: ChatStatus,
    },
    /// Create or overwrite the request `from -> to`.
    UpsertFriendRequest {
        from: String,
        to: String,
        status: FriendRequestStatus,
    },
    /// Delete the request `from -> to`, whatever its status.
    DeleteFriendRequest { from: String, to: String },
    /// Record a block.
    AddBlock { blocker: String, blockee: String },
    /// Lift a block.
    RemoveBlock { blocker: String, blockee: String },
}

impl RelationWrite {
    /// Room status write given viewer-relative statuses.
    #[must_use]
    pub fn chat_room(viewer: &str, other: &str, mine: ChatStatus, theirs: ChatStatus) -> Self {
        let (user_a, user_b) = sorted_pair(viewer, other);
        let (status_a, status_b) = if user_a == viewer {
            (mine, theirs)
        } else {
            (theirs, mine)
        };

        Self::PutChatRoom {
            user_a: user_a.to_string(),
            user_b: user_b.to_string(),
            status_a,
            status_b,
        }
    }
}

/// Transactional writer for [`RelationWrite`] batches.
#[derive(Clone)]
pub struct RelationRepository {
    db: Arc<DatabaseConnection>,
    id_gen: IdGenerator,
}

impl RelationRepository {
    /// Create a new relation repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            id_gen: IdGenerator::new(),
        }
    }

    /// Apply every write or none of them.
    pub async fn apply(&self, writes: &[RelationWrite]) -> AppResult<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin().await.map_err(db_err)?;
        for write in writes {
            self.apply_one(&txn, write).await?;
        }
        txn.commit().await.map_err(db_err)?;

        debug!(writes = writes.len(), "Applied relation batch");
        Ok(())
    }

    async fn apply_one(&self, txn: &DatabaseTransaction, write: &RelationWrite) -> AppResult<()> {
        let now = Utc::now().fixed_offset();

        match write {
            RelationWrite::AddFriendPair { a, b } => {
                let rows = [(a, b), (b, a)].map(|(user, friend)| friendship::ActiveModel {
                    id: Set(self.id_gen.generate()),
                    user_id: Set(user.clone()),
                    friend_id: Set(friend.clone()),
                    created_at: Set(now),
                });
                Friendship::insert_many(rows)
                    .on_conflict(
                        OnConflict::columns([
                            friendship::Column::UserId,
                            friendship::Column::FriendId,
                        ])
                        .do_nothing()
                        .to_owned(),
                    )
                    .exec_without_returning(txn)
                    .await
                    .map_err(db_err)?;
            }
            RelationWrite::RemoveFriendPair { a, b } => {
                for (user, friend) in [(a, b), (b, a)] {
                    Friendship::delete_many()
                        .filter(friendship::Column::UserId.eq(user.as_str()))
                        .filter(friendship::Column::FriendId.eq(friend.as_str()))
                        .exec(txn)
                        .await
                        .map_err(db_err)?;
                }
            }
            RelationWrite::PutChatRoom {
                user_a,
                user_b,
                status_a,
                status_b,
            } => {
                let room = chat_room::ActiveModel {
                    id: Set(chat_room_id(user_a, user_b)),
                    user_a: Set(user_a.clone()),
                    user_b: Set(user_b.clone()),
                    status_a: Set(*status_a),
                    status_b: Set(*status_b),
                    created_at: Set(now),
                    updated_at: Set(Some(now)),
                    last_message_at: Set(None),
                };
                ChatRoom::insert(room)
                    .on_conflict(
                        OnConflict::column(chat_room::Column::Id)
                            .update_columns([
                                chat_room::Column::StatusA,
                                chat_room::Column::StatusB,
                                chat_room::Column::UpdatedAt,
                            ])
                            .to_owned(),
                    )
                    .exec_without_returning(txn)
                    .await
                    .map_err(db_err)?;
            }
            RelationWrite::UpsertFriendRequest { from, to, status } => {
                let request = friend_request::ActiveModel {
                    id: Set(friend_request_id(from, to)),
                    from_id: Set(from.clone()),
                    to_id: Set(to.clone()),
                    status: Set(*status),
                    created_at: Set(now),
                    updated_at: Set(Some(now)),
                };
                FriendRequest::insert(request)
                    .on_conflict(
                        OnConflict::column(friend_request::Column::Id)
                            .update_columns([
                                friend_request::Column::Status,
                                friend_request::Column::UpdatedAt,
                            ])
                            .to_owned(),
                    )
                    .exec_without_returning(txn)
                    .await
                    .map_err(db_err)?;
            }
            RelationWrite::DeleteFriendRequest { from, to } => {
                FriendRequest::delete_by_id(friend_request_id(from, to))
                    .exec(txn)
                    .await
                    .map_err(db_err)?;
            }
            RelationWrite::AddBlock { blocker, blockee } => {
                let row = blocking::ActiveModel {
                    id: Set(self.id_gen.generate()),
                    blocker_id: Set(blocker.clone()),
                    blockee_id: Set(blockee.clone()),
                    created_at: Set(now),
                };
                Blocking::insert(row)
                    .on_conflict(
                        OnConflict::columns([
                            blocking::Column::BlockerId,
                            blocking::Column::BlockeeId,
                        ])
                        .do_nothing()
                        .to_owned(),
                    )
                    .exec_without_returning(txn)
                    .await
                    .map_err(db_err)?;
            }
            RelationWrite::RemoveBlock { blocker, blockee } => {
                Blocking::delete_many()
                    .filter(blocking::Column::BlockerId.eq(blocker.as_str()))
                    .filter(blocking::Column::BlockeeId.eq(blockee.as_str()))
                    .exec(txn)
                    .await
                    .map_err(db_err)?;
            }
        }

        Ok(())
    }
}
