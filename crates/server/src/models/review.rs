//! Dish reviews.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cravecart_core::lifecycle;
use cravecart_core::{FoodId, OrderId, ReviewId, UserId};

/// A customer's review of one dish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub user_id: UserId,
    pub food_id: FoodId,
    /// The delivered order the dish came in, if the author named one.
    pub order_id: Option<OrderId>,
    pub rating: i16,
    pub title: String,
    pub comment: String,
    pub helpful: i32,
    pub unhelpful: i32,
    /// Backed by a delivered order.
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/review`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub food_id: FoodId,
    #[serde(default)]
    pub order_id: Option<OrderId>,
    pub rating: i16,
    pub title: String,
    #[serde(default)]
    pub comment: Option<String>,
}

fn check_rating(rating: i16) -> Result<(), String> {
    if lifecycle::is_valid_rating(rating) {
        Ok(())
    } else {
        Err(format!(
            "Rating must be between {} and {}",
            lifecycle::MIN_RATING,
            lifecycle::MAX_RATING
        ))
    }
}

impl NewReview {
    /// Trim the text fields.
    ///
    /// # Errors
    ///
    /// Returns a message for a blank title or a rating outside 1-5.
    pub fn normalized(self) -> Result<Self, String> {
        check_rating(self.rating)?;
        let title = self.title.trim().to_owned();
        if title.is_empty() {
            return Err("Title is required".to_string());
        }
        Ok(Self {
            title,
            comment: self.comment.map(|c| c.trim().to_owned()),
            ..self
        })
    }
}

/// Body of `PUT /api/review/{id}`. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewUpdate {
    pub title: Option<String>,
    pub comment: Option<String>,
    pub rating: Option<i16>,
}

impl ReviewUpdate {
    /// Trim the text fields.
    ///
    /// # Errors
    ///
    /// Returns a message for a blank title or a rating outside 1-5.
    pub fn normalized(self) -> Result<Self, String> {
        if let Some(rating) = self.rating {
            check_rating(rating)?;
        }
        let title = self.title.map(|t| t.trim().to_owned());
        if title.as_deref().is_some_and(str::is_empty) {
            return Err("Title cannot be empty".to_string());
        }
        Ok(Self {
            title,
            comment: self.comment.map(|c| c.trim().to_owned()),
            rating: self.rating,
        })
    }

    /// Apply to `review` in place.
    pub fn apply(&self, review: &mut Review) {
        if let Some(title) = &self.title {
            review.title.clone_from(title);
        }
        if let Some(comment) = &self.comment {
            review.comment.clone_from(comment);
        }
        if let Some(rating) = self.rating {
            review.rating = rating;
        }
    }
}

/// Vote tallies after `POST /api/review/{id}/helpful`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ReviewVotes {
    pub helpful: i32,
    pub unhelpful: i32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn review() -> NewReview {
        NewReview {
            food_id: FoodId::new(1),
            order_id: None,
            rating: 4,
            title: "  Crisp and hot ".to_string(),
            comment: Some(" Arrived fast ".to_string()),
        }
    }

    #[test]
    fn new_review_is_trimmed_and_checked() {
        let ok = review().normalized().unwrap();
        assert_eq!(ok.title, "Crisp and hot");
        assert_eq!(ok.comment.as_deref(), Some("Arrived fast"));

        let blank = NewReview {
            title: "   ".to_string(),
            ..review()
        };
        assert_eq!(blank.normalized().unwrap_err(), "Title is required");

        for rating in [0, 6] {
            let out_of_range = NewReview {
                rating,
                ..review()
            };
            assert!(out_of_range.normalized().is_err());
        }
    }

    #[test]
    fn update_applies_only_given_fields() {
        let now = Utc::now();
        let mut stored = Review {
            id: ReviewId::new(1),
            user_id: UserId::new(2),
            food_id: FoodId::new(3),
            order_id: None,
            rating: 2,
            title: "Cold".to_string(),
            comment: "Took an hour".to_string(),
            helpful: 0,
            unhelpful: 0,
            verified: false,
            created_at: now,
            updated_at: now,
        };
        let update = ReviewUpdate {
            rating: Some(4),
            ..ReviewUpdate::default()
        }
        .normalized()
        .unwrap();
        update.apply(&mut stored);
        assert_eq!(stored.rating, 4);
        assert_eq!(stored.title, "Cold");

        let blank = ReviewUpdate {
            title: Some(" ".to_string()),
            ..ReviewUpdate::default()
        };
        assert!(blank.normalized().is_err());
    }
}
