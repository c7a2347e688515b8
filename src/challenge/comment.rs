//! Comments on plannings.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ServerError;
use crate::challenge::Comment;
use crate::clock::Clock;
use crate::database::Store;
use crate::error::Result;
use crate::id::{CommentId, PlanningId, UserId};

const ANONYMOUS: &str = "Anonymous";

/// Comment rendered with its author's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub user: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Comments {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl Comments {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Comment on an existing planning.
    pub async fn post(
        &self,
        planning: &PlanningId,
        user: &UserId,
        text: &str,
    ) -> Result<Comment> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ServerError::InvalidArgument("text is required".into()));
        }
        if self.store.find_planning(planning).await?.is_none() {
            return Err(ServerError::not_found("planning"));
        }

        let comment = Comment {
            id: CommentId::generate(),
            planning_id: *planning,
            user_id: *user,
            text: text.to_owned(),
            created_at: self.clock.now(),
        };
        self.store.insert_comment(&comment).await?;

        Ok(comment)
    }

    /// Comments of a planning with author names, oldest first.
    pub async fn list(&self, planning: &PlanningId) -> Result<Vec<CommentView>> {
        let comments = self.store.list_comments(planning).await?;

        let mut authors: Vec<UserId> = comments.iter().map(|c| c.user_id).collect();
        authors.sort();
        authors.dedup();
        let names: HashMap<UserId, String> = self
            .store
            .find_users(&authors)
            .await?
            .into_iter()
            .map(|user| (user.id, user.username))
            .collect();

        Ok(comments
            .into_iter()
            .map(|comment| CommentView {
                user: names
                    .get(&comment.user_id)
                    .cloned()
                    .unwrap_or_else(|| ANONYMOUS.to_owned()),
                text: comment.text,
                created_at: comment.created_at,
            })
            .collect())
    }
}
