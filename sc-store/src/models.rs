use std::collections::BTreeMap;
use std::sync::Arc;

use itertools::Itertools;
use sc::basic_models::{Ingredient, Instruction, Question, RecipeRecord, RecipeSummary, Tool};
use serde_json::Value;

use crate::errors::{StoreError, StoreResult};
use crate::record_store::{Record, RecordStore};

/// A single-field change to a recipe record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecipePatch {
    Ingredients(Vec<Ingredient>),
    Tools(Vec<Tool>),
    Instructions(Vec<Instruction>),
    Questions(BTreeMap<usize, Vec<Question>>),
}

impl RecipePatch {
    pub fn field(&self) -> &'static str {
        match self {
            RecipePatch::Ingredients(_) => "ingredients",
            RecipePatch::Tools(_) => "tools",
            RecipePatch::Instructions(_) => "instructions",
            RecipePatch::Questions(_) => "questions",
        }
    }

    fn into_record(self) -> StoreResult<Record> {
        let field = self.field();
        let value = match self {
            RecipePatch::Ingredients(items) | RecipePatch::Tools(items) => {
                serde_json::to_value(items)?
            }
            RecipePatch::Instructions(steps) => serde_json::to_value(steps)?,
            RecipePatch::Questions(questions) => serde_json::to_value(questions)?,
        };
        let mut record = Record::new();
        record.insert(field.into(), value);
        Ok(record)
    }
}

/// Typed access to recipe history on top of any [`RecordStore`].
#[derive(Clone)]
pub struct RecipeRepository {
    store: Arc<dyn RecordStore>,
}

impl RecipeRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Persist a newly identified recipe. Returns its key.
    pub async fn create_recipe(&self, recipe: &RecipeRecord) -> StoreResult<String> {
        match serde_json::to_value(recipe)? {
            Value::Object(record) => self.store.create(record).await,
            _ => Err(StoreError::InvalidRecord(
                "recipe did not encode as an object".into(),
            )),
        }
    }

    pub async fn get_recipe(&self, id: &str) -> StoreResult<Option<RecipeRecord>> {
        self.store
            .read(id)
            .await?
            .map(|record| serde_json::from_value(Value::Object(record)).map_err(Into::into))
            .transpose()
    }

    /// Merge one generated field into the stored recipe.
    pub async fn patch(&self, id: &str, patch: RecipePatch) -> StoreResult<()> {
        tracing::debug!("Saving {} for recipe {}", patch.field(), id);
        self.store.update(id, patch.into_record()?).await?;
        Ok(())
    }

    /// Every stored recipe, newest first. Records that no longer decode are skipped.
    pub async fn list_history(&self) -> StoreResult<Vec<RecipeSummary>> {
        Ok(self
            .store
            .read_all()
            .await?
            .into_iter()
            .filter_map(|record| {
                match serde_json::from_value::<RecipeSummary>(Value::Object(record)) {
                    Ok(summary) => Some(summary),
                    Err(e) => {
                        tracing::warn!("Skipping unreadable history entry: {}", e);
                        None
                    }
                }
            })
            .sorted_by(|a, b| b.timestamp.cmp(&a.timestamp))
            .collect())
    }

    pub async fn erase_history(&self) -> StoreResult<()> {
        self.store.erase().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use sc::basic_models::Unit;

    fn unit(name: &str, quantity: f64) -> Unit {
        Unit {
            name: name.into(),
            quantity,
            unit: "piece".into(),
            confidence: 90.0,
        }
    }

    fn repo() -> RecipeRepository {
        RecipeRepository::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_ingredients_then_tools_both_survive() {
        let repo = repo();
        let recipe = RecipeRecord::new("r1", "Soto Ayam", 92.0, vec![1], "2024-05-01T10:00:00Z");
        repo.create_recipe(&recipe).await.unwrap();

        repo.patch("r1", RecipePatch::Ingredients(vec![unit("chicken", 1.0)]))
            .await
            .unwrap();
        repo.patch("r1", RecipePatch::Tools(vec![unit("stock pot", 1.0)]))
            .await
            .unwrap();

        let stored = repo.get_recipe("r1").await.unwrap().unwrap();
        assert_eq!(stored.name, "Soto Ayam");
        assert_eq!(stored.confidence, 92.0);
        assert_eq!(stored.ingredients.unwrap()[0].name, "chicken");
        assert_eq!(stored.tools.unwrap()[0].name, "stock pot");
    }

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let repo = repo();
        for (id, ts) in [
            ("old", "2024-01-01T00:00:00Z"),
            ("new", "2024-03-01T00:00:00Z"),
            ("mid", "2024-02-01T00:00:00Z"),
        ] {
            repo.create_recipe(&RecipeRecord::new(id, id, 50.0, vec![], ts))
                .await
                .unwrap();
        }
        let ids: Vec<_> = repo
            .list_history()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, ["new", "mid", "old"]);

        repo.erase_history().await.unwrap();
        assert!(repo.list_history().await.unwrap().is_empty());
    }
}
