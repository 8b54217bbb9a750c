//! Training corpus and outlier log
//!
//! Writes arrive only as [`RoutedInteraction`]s, so each interaction lands in
//! exactly the table its serve-time label names.

use crate::mixing::{Label, RoutedInteraction};
use async_stream::try_stream;
use curio_common::db::{OutlierInteraction, TrainingInteraction};
use curio_common::{Database, Error, Result};
use futures::stream::BoxStream;
use serde::Serialize;
use tracing::{debug, info};

/// Rows fetched per export page
pub const EXPORT_PAGE_SIZE: i64 = 256;

/// Where an interaction was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusTable {
    TrainingInteractions,
    OutlierInteractions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedInteraction {
    pub table: CorpusTable,
    pub id: i64,
    pub label: Label,
}

/// Row counts for analytics reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    pub training: i64,
    pub outlier: i64,
}

/// Lazy export of the training corpus
///
/// Only rows with `id <= upper_bound` (the largest id when the export
/// started) are yielded.
pub struct TrainingExport {
    pub upper_bound: i64,
    pub rows: BoxStream<'static, Result<TrainingInteraction>>,
}

/// Append a routed interaction to the table its label selects
pub async fn record(db: &Database, interaction: &RoutedInteraction) -> Result<RecordedInteraction> {
    let mut tx = db.begin().await?;

    let recorded = match interaction.label() {
        Label::Personalized => {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO training_interactions (query, chosen_object_id, features, timestamp)
                VALUES (?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(interaction.query())
            .bind(interaction.object_id())
            .bind(serde_json::to_string(interaction.features())?)
            .bind(interaction.timestamp())
            .fetch_one(&mut *tx)
            .await?;

            RecordedInteraction {
                table: CorpusTable::TrainingInteractions,
                id,
                label: Label::Personalized,
            }
        }
        Label::Outlier => {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO outlier_interactions (query, shown_object_id, timestamp)
                VALUES (?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(interaction.query())
            .bind(interaction.object_id())
            .bind(interaction.timestamp())
            .fetch_one(&mut *tx)
            .await?;

            RecordedInteraction {
                table: CorpusTable::OutlierInteractions,
                id,
                label: Label::Outlier,
            }
        }
    };

    tx.commit().await?;

    debug!(
        table = ?recorded.table,
        id = recorded.id,
        object_id = interaction.object_id(),
        "Recorded interaction"
    );
    Ok(recorded)
}

/// Delete every training row; the outlier log and everything else stay
pub async fn reset_training_data(db: &Database) -> Result<u64> {
    let deleted = sqlx::query("DELETE FROM training_interactions")
        .execute(db.pool())
        .await?
        .rows_affected();

    info!(deleted, "Training data reset");
    Ok(deleted)
}

/// Export rows with `id > after_id`
///
/// Pages are read in id order with no transaction held between pages, so
/// writers are never blocked by a slow consumer. Restart an interrupted
/// export by passing the last id received.
pub async fn export_from(db: &Database, after_id: i64) -> Result<TrainingExport> {
    let upper_bound: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) FROM training_interactions")
            .fetch_one(db.pool())
            .await?;

    let pool = db.pool().clone();
    let rows = try_stream! {
        let mut cursor = after_id;
        loop {
            let page = sqlx::query_as::<_, TrainingInteraction>(
                r#"
                SELECT id, query, chosen_object_id, features, timestamp
                FROM training_interactions
                WHERE id > ? AND id <= ?
                ORDER BY id
                LIMIT ?
                "#,
            )
            .bind(cursor)
            .bind(upper_bound)
            .bind(EXPORT_PAGE_SIZE)
            .fetch_all(&pool)
            .await
            .map_err(Error::from)?;

            let Some(last) = page.last() else {
                break;
            };
            cursor = last.id;
            let exhausted = (page.len() as i64) < EXPORT_PAGE_SIZE;

            for row in page {
                yield row;
            }

            if exhausted {
                break;
            }
        }
    };

    debug!(after_id, upper_bound, "Starting training export");
    Ok(TrainingExport {
        upper_bound,
        rows: Box::pin(rows),
    })
}

pub async fn stats(db: &Database) -> Result<CorpusStats> {
    let (training, outlier): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM training_interactions),
            (SELECT COUNT(*) FROM outlier_interactions)
        "#,
    )
    .fetch_one(db.pool())
    .await?;

    Ok(CorpusStats { training, outlier })
}

/// Outlier log, oldest first
pub async fn list_outliers(db: &Database) -> Result<Vec<OutlierInteraction>> {
    let rows = sqlx::query_as::<_, OutlierInteraction>(
        "SELECT id, query, shown_object_id, timestamp FROM outlier_interactions ORDER BY id",
    )
    .fetch_all(db.pool())
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixing::{LabeledCandidate, ServeLedger};
    use crate::provider::Candidate;
    use curio_common::db::init_database;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = init_database(&dir.path().join("curio.db")).await.unwrap();
        (dir, db)
    }

    fn routed(ledger: &ServeLedger, object_id: &str, label: Label) -> RoutedInteraction {
        let served = [LabeledCandidate {
            label,
            candidate: Candidate::new(object_id, 0).with_category("lamps"),
        }];
        let ids = ledger.record("lamp", &served);
        ledger.route(&ids[0], label).unwrap()
    }

    #[tokio::test]
    async fn test_record_goes_to_labeled_table() {
        let (_dir, db) = setup().await;
        let ledger = ServeLedger::default();

        let training = record(&db, &routed(&ledger, "a", Label::Personalized)).await.unwrap();
        let outlier = record(&db, &routed(&ledger, "b", Label::Outlier)).await.unwrap();

        assert_eq!(training.table, CorpusTable::TrainingInteractions);
        assert_eq!(outlier.table, CorpusTable::OutlierInteractions);
        assert_eq!(stats(&db).await.unwrap(), CorpusStats { training: 1, outlier: 1 });

        let outliers = list_outliers(&db).await.unwrap();
        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers[0].shown_object_id, "b");
    }

    #[tokio::test]
    async fn test_export_streams_all_rows_in_order() {
        let (_dir, db) = setup().await;
        let ledger = ServeLedger::default();
        let total = EXPORT_PAGE_SIZE as usize + 10;
        for i in 0..total {
            record(&db, &routed(&ledger, &format!("obj-{}", i), Label::Personalized))
                .await
                .unwrap();
        }

        let export = export_from(&db, 0).await.unwrap();
        let rows: Vec<TrainingInteraction> = export.rows.try_collect().await.unwrap();

        assert_eq!(rows.len(), total);
        assert_eq!(rows[0].chosen_object_id, "obj-0");
        assert_eq!(rows[0].features["category"], "lamps");
        assert!(rows.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_export_snapshot_excludes_later_rows() {
        let (_dir, db) = setup().await;
        let ledger = ServeLedger::default();
        for i in 0..3 {
            record(&db, &routed(&ledger, &format!("obj-{}", i), Label::Personalized))
                .await
                .unwrap();
        }

        let export = export_from(&db, 0).await.unwrap();
        record(&db, &routed(&ledger, "late", Label::Personalized)).await.unwrap();

        let rows: Vec<TrainingInteraction> = export.rows.try_collect().await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.chosen_object_id != "late"));
    }

    #[tokio::test]
    async fn test_export_from_cursor_resumes() {
        let (_dir, db) = setup().await;
        let ledger = ServeLedger::default();
        for i in 0..5 {
            record(&db, &routed(&ledger, &format!("obj-{}", i), Label::Personalized))
                .await
                .unwrap();
        }

        let all: Vec<TrainingInteraction> = export_from(&db, 0).await.unwrap().rows.try_collect().await.unwrap();
        let resumed: Vec<TrainingInteraction> = export_from(&db, all[1].id)
            .await
            .unwrap()
            .rows
            .try_collect()
            .await
            .unwrap();

        assert_eq!(resumed, all[2..].to_vec());
    }

    #[tokio::test]
    async fn test_reset_training_keeps_outliers() {
        let (_dir, db) = setup().await;
        let ledger = ServeLedger::default();
        record(&db, &routed(&ledger, "a", Label::Personalized)).await.unwrap();
        record(&db, &routed(&ledger, "b", Label::Outlier)).await.unwrap();

        assert_eq!(reset_training_data(&db).await.unwrap(), 1);
        assert_eq!(stats(&db).await.unwrap(), CorpusStats { training: 0, outlier: 1 });
    }
}
