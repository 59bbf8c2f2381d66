//! Point-award hooks for community content.
//!
//! Forum and study-group handlers live outside this service and link the
//! library directly. They call these hooks after the content is stored, so the
//! award goes through the points account like every other balance change. No
//! HTTP route exposes them.

use crate::{
    core::points::{self, Posting, PointsEntry},
    entities::points_history::PointsType,
    errors::Result,
};
use sea_orm::DatabaseConnection;

/// Points for creating a forum post.
pub const FORUM_POST_POINTS: i64 = 5;

/// Points for creating a study group.
pub const STUDY_GROUP_POINTS: i64 = 10;

/// Credits [`FORUM_POST_POINTS`] for a new forum post.
///
/// # Errors
/// Returns an error if the user does not exist or the database operation fails.
pub async fn award_forum_post(
    db: &DatabaseConnection,
    user_id: i64,
    post_id: i64,
) -> Result<Posting> {
    points::credit(
        db,
        PointsEntry::new(
            user_id,
            FORUM_POST_POINTS,
            PointsType::ForumPost,
            "Created a forum post",
        )
        .with_reference(post_id.to_string()),
    )
    .await
}

/// Credits [`STUDY_GROUP_POINTS`] for a new study group.
///
/// # Errors
/// Returns an error if the user does not exist or the database operation fails.
pub async fn award_study_group(
    db: &DatabaseConnection,
    user_id: i64,
    group_id: i64,
) -> Result<Posting> {
    points::credit(
        db,
        PointsEntry::new(
            user_id,
            STUDY_GROUP_POINTS,
            PointsType::StudyGroup,
            "Created a study group",
        )
        .with_reference(group_id.to_string()),
    )
    .await
}
