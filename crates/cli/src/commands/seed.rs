//! Seed the catalog with dishes from a YAML file.
//!
//! The file is a list of dishes in the same shape the create-dish endpoint
//! accepts:
//!
//! ```yaml
//! - name: Paneer Tikka
//!   description: Char-grilled cottage cheese
//!   price: "249.00"
//!   category: Starters
//!   discountPercent: 10
//! - name: Gulab Jamun
//!   description: Two pieces
//!   price: "99"
//!   category: Desserts
//! ```

use std::path::Path;

use tracing::{error, info, warn};

use cravecart_server::db::{self, FoodRepository, PgStore};
use cravecart_server::models::NewFoodItem;

/// Parse and validate a catalog file.
///
/// Returns every invalid entry as `"#<index> <name>: <reason>"`.
fn parse_catalog(content: &str) -> Result<Vec<NewFoodItem>, Box<dyn std::error::Error>> {
    let foods: Vec<NewFoodItem> = serde_yaml::from_str(content)?;

    let errors: Vec<String> = foods
        .iter()
        .enumerate()
        .filter_map(|(i, food)| {
            food.validate()
                .err()
                .map(|reason| format!("#{} {}: {reason}", i + 1, food.name))
        })
        .collect();

    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    Ok(foods)
}

/// Seed dishes from a YAML file.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the file cannot be read
/// or fails validation, or the database is unreachable. A dish that fails to
/// insert is logged and skipped.
pub async fn foods(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading dishes from file");

    // Read and validate before connecting to database
    let content = tokio::fs::read_to_string(path).await?;
    let foods = parse_catalog(&content)?;
    info!(dishes = foods.len(), "Catalog validated");

    let database_url = super::database_url()?;
    let store = PgStore::new(db::create_pool(&database_url).await?);
    info!("Connected to database");

    let mut inserted = 0usize;
    for food in &foods {
        match store.create_food(food).await {
            Ok(created) => {
                inserted += 1;
                info!(food_id = %created.id, name = %created.name, "Dish added");
            }
            Err(e) => warn!(name = %food.name, error = %e, "Dish skipped"),
        }
    }

    info!("Seeding complete!");
    info!("  Dishes inserted: {inserted}");
    info!("  Dishes skipped: {}", foods.len() - inserted);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_catalog() {
        let foods = parse_catalog(
            r#"
- name: Paneer Tikka
  description: Char-grilled cottage cheese
  price: "249.00"
  category: Starters
  discountPercent: 10
- name: Gulab Jamun
  description: Two pieces
  price: "99"
  category: Desserts
  available: false
"#,
        )
        .unwrap();

        assert_eq!(foods.len(), 2);
        assert_eq!(foods[0].category, "Starters");
        assert!(foods[0].available);
        assert!(!foods[1].available);
    }

    #[test]
    fn rejects_invalid_dishes() {
        let result = parse_catalog(
            r#"
- name: ""
  description: nameless
  price: "10"
  category: Mains
"#,
        );
        assert!(result.is_err());
    }
}
