use std::collections::HashMap;

use rand::distr::weighted::WeightedIndex;
use rusqlite::Connection;

use inboxforge_core::{LabelSpec, mailbox};

use crate::config::{GenerationConfig, Probabilities};
use crate::errors::GenerationError;
use crate::rng::{RngContext, weighted};
use crate::value::{GeneratedValue, RowInsert};

/// Label ids per (source, label name).
#[derive(Debug, Default)]
pub struct LabelIndex {
    ids: HashMap<(i64, String), i64>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate the whole catalog for one source.
    pub fn create_for_source(
        &mut self,
        conn: &Connection,
        source_id: i64,
        catalog: &[LabelSpec],
    ) -> Result<(), GenerationError> {
        for label in catalog {
            let id = RowInsert::into_table("labels")
                .set("source_id", GeneratedValue::Int(source_id))
                .set("source_label_id", GeneratedValue::text(&label.name))
                .set("name", GeneratedValue::text(&label.name))
                .set("label_type", GeneratedValue::text(label.kind.as_str()))
                .execute(conn)?;
            self.ids.insert((source_id, label.name.clone()), id);
        }
        Ok(())
    }

    pub fn id(&self, source_id: i64, name: &str) -> Result<i64, GenerationError> {
        self.ids
            .get(&(source_id, name.to_string()))
            .copied()
            .ok_or_else(|| {
                GenerationError::Integrity(format!(
                    "label '{name}' does not exist for source {source_id}"
                ))
            })
    }
}

/// Chooses the labels of a generated message.
///
/// Sent mail gets `SENT` only. Received mail gets `INBOX`, optional
/// `STARRED`/`IMPORTANT` overlays, exactly one weighted category and
/// sometimes one user label.
pub struct LabelPlanner {
    probabilities: Probabilities,
    categories: Vec<String>,
    category_weights: WeightedIndex<u32>,
    user_labels: Vec<String>,
}

impl LabelPlanner {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let weights: Vec<u32> = config.category_weights.iter().map(|c| c.weight).collect();
        Ok(Self {
            probabilities: config.probabilities,
            categories: config
                .category_weights
                .iter()
                .map(|c| c.label.clone())
                .collect(),
            category_weights: weighted(&weights)?,
            user_labels: config
                .user_labels()
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
    }

    pub fn plan(&self, rng: &mut RngContext, is_sent: bool) -> Vec<String> {
        if is_sent {
            return vec![mailbox::SENT.to_string()];
        }

        let mut labels = vec![mailbox::INBOX.to_string()];
        if rng.chance(self.probabilities.starred) {
            labels.push(mailbox::STARRED.to_string());
        }
        if rng.chance(self.probabilities.important) {
            labels.push(mailbox::IMPORTANT.to_string());
        }
        let category = rng.sample(&self.category_weights);
        if let Some(name) = self.categories.get(category) {
            labels.push(name.clone());
        }
        if rng.chance(self.probabilities.user_label)
            && let Some(name) = rng.pick(&self.user_labels)
        {
            labels.push(name.clone());
        }
        labels
    }
}
