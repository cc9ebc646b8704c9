//! Repository layer for the persisted ledger state.
//!
//! Two tables: open acquisition lots, and the valuation-ratio history that
//! feeds the momentum window. Every mutating call that spans more than one
//! row runs inside a transaction, so a crash mid-write leaves either the
//! full change or none of it.

use crate::domain::{
    Decimal, DisposalPlan, Lot, LotId, Pool, TimeMs, ValuationObservation,
};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

/// Repository for ledger store operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    // =========================================================================
    // Lot operations
    // =========================================================================

    /// Insert a batch of lots atomically (one deposit's core/trading pair,
    /// or a manual backfill).
    ///
    /// # Errors
    /// Returns an error if the transaction fails; no partial insert is
    /// visible afterwards.
    pub async fn insert_lots(&self, lots: &[Lot]) -> Result<(), sqlx::Error> {
        if lots.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for lot in lots {
            insert_lot_tx(&mut tx, lot).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Apply a disposal plan: shrink partially consumed lots, delete
    /// exhausted ones, all in a single transaction.
    pub async fn apply_disposal(&self, plan: &DisposalPlan) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        apply_disposal_tx(&mut tx, plan).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Persist one full decision cycle atomically: the bought lots, the
    /// disposal, and the snapshot's valuation observation. Either all of
    /// it is durable or none of it.
    pub async fn commit_decision(
        &self,
        new_lots: &[Lot],
        plan: Option<&DisposalPlan>,
        observation: Option<&ValuationObservation>,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for lot in new_lots {
            insert_lot_tx(&mut tx, lot).await?;
        }
        if let Some(plan) = plan {
            apply_disposal_tx(&mut tx, plan).await?;
        }
        if let Some(obs) = observation {
            sqlx::query(
                r#"
                INSERT INTO valuation_history (time_ms, valuation_ratio)
                VALUES (?, ?)
                ON CONFLICT(time_ms) DO NOTHING
                "#,
            )
            .bind(obs.time_ms.as_i64())
            .bind(obs.valuation_ratio)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Load every open lot, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row's pool/id column is
    /// unreadable.
    pub async fn load_lots(&self) -> Result<Vec<Lot>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, pool, quantity, unit_cost, acquired_at_ms, note
            FROM lots
            ORDER BY acquired_at_ms ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(lot_from_row).collect()
    }

    // =========================================================================
    // Valuation history operations
    // =========================================================================

    /// Insert a valuation observation, deduplicated by timestamp.
    ///
    /// Returns true when the row was new.
    pub async fn insert_valuation_observation(
        &self,
        obs: &ValuationObservation,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO valuation_history (time_ms, valuation_ratio)
            VALUES (?, ?)
            ON CONFLICT(time_ms) DO NOTHING
            "#,
        )
        .bind(obs.time_ms.as_i64())
        .bind(obs.valuation_ratio)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Insert a batch of observations in one transaction (history backfill).
    ///
    /// Returns the number of newly inserted rows (excludes duplicates).
    pub async fn insert_valuation_batch(
        &self,
        observations: &[ValuationObservation],
    ) -> Result<usize, sqlx::Error> {
        if observations.is_empty() {
            return Ok(0);
        }

        let mut total_inserted = 0usize;
        let mut tx = self.pool.begin().await?;

        for obs in observations {
            let result = sqlx::query(
                r#"
                INSERT INTO valuation_history (time_ms, valuation_ratio)
                VALUES (?, ?)
                ON CONFLICT(time_ms) DO NOTHING
                "#,
            )
            .bind(obs.time_ms.as_i64())
            .bind(obs.valuation_ratio)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                total_inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    /// The most recent `limit` observations, returned oldest-first and
    /// deduplicated by timestamp (the table's primary key).
    pub async fn query_valuation_window(
        &self,
        limit: usize,
    ) -> Result<Vec<ValuationObservation>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT time_ms, valuation_ratio
            FROM (
                SELECT time_ms, valuation_ratio
                FROM valuation_history
                ORDER BY time_ms DESC
                LIMIT ?
            )
            ORDER BY time_ms ASC
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                ValuationObservation::new(
                    TimeMs::new(row.get("time_ms")),
                    row.get("valuation_ratio"),
                )
            })
            .collect())
    }
}

async fn insert_lot_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    lot: &Lot,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO lots (id, pool, quantity, unit_cost, acquired_at_ms, note)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(lot.id.to_string())
    .bind(lot.pool.as_str())
    .bind(lot.quantity.to_canonical_string())
    .bind(lot.unit_cost.to_canonical_string())
    .bind(lot.acquired_at.as_i64())
    .bind(lot.note.as_deref())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn apply_disposal_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    plan: &DisposalPlan,
) -> Result<(), sqlx::Error> {
    for record in &plan.records {
        if record.exhausts_lot() {
            sqlx::query("DELETE FROM lots WHERE id = ?")
                .bind(record.lot_id.to_string())
                .execute(&mut **tx)
                .await?;
        } else {
            sqlx::query("UPDATE lots SET quantity = ? WHERE id = ?")
                .bind(record.remaining.to_canonical_string())
                .bind(record.lot_id.to_string())
                .execute(&mut **tx)
                .await?;
        }
    }
    Ok(())
}

fn lot_from_row(row: &SqliteRow) -> Result<Lot, sqlx::Error> {
    let id_str: String = row.get("id");
    let pool_str: String = row.get("pool");
    let quantity_str: String = row.get("quantity");
    let unit_cost_str: String = row.get("unit_cost");
    let acquired_at_ms: i64 = row.get("acquired_at_ms");
    let note: Option<String> = row.get("note");

    let id = LotId::parse(&id_str).map_err(|e| sqlx::Error::ColumnDecode {
        index: "id".to_string(),
        source: Box::new(e),
    })?;
    let pool = Pool::from_str(&pool_str).map_err(|e| sqlx::Error::ColumnDecode {
        index: "pool".to_string(),
        source: Box::new(e),
    })?;

    let quantity = Decimal::from_str(&quantity_str).unwrap_or_else(|e| {
        warn!(lot = %id_str, quantity = %quantity_str, error = %e, "Failed to parse lot quantity decimal, using default");
        Decimal::default()
    });
    let unit_cost = Decimal::from_str(&unit_cost_str).unwrap_or_else(|e| {
        warn!(lot = %id_str, unit_cost = %unit_cost_str, error = %e, "Failed to parse lot unit cost decimal, using default");
        Decimal::default()
    });

    Ok(Lot {
        id,
        pool,
        quantity,
        unit_cost,
        acquired_at: TimeMs::new(acquired_at_ms),
        note,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::ledger::PositionLedger;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db").to_string_lossy().to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_load_lots_roundtrip() {
        let (repo, _temp) = setup_test_db().await;

        let mut ledger = PositionLedger::new();
        let split = ledger
            .deposit(dec("1.0"), dec("50000"), TimeMs::new(1000), dec("0.4"), Some("weekly buy"))
            .unwrap();
        let lots: Vec<Lot> = split.lots().cloned().collect();

        repo.insert_lots(&lots).await.expect("insert failed");
        let loaded = repo.load_lots().await.expect("load failed");

        let reloaded = PositionLedger::from_lots(loaded);
        assert_eq!(reloaded.summary(), ledger.summary());
        assert_eq!(reloaded.lots().len(), 2);
        assert_eq!(reloaded.lots()[0].note.as_deref(), Some("weekly buy"));
    }

    #[tokio::test]
    async fn test_disposal_persists() {
        let (repo, _temp) = setup_test_db().await;

        let mut ledger = PositionLedger::new();
        let split = ledger
            .deposit(dec("1.0"), dec("50000"), TimeMs::new(1000), dec("0.4"), None)
            .unwrap();
        repo.insert_lots(&split.lots().cloned().collect::<Vec<_>>())
            .await
            .unwrap();

        let plan = ledger.dispose(Pool::Trading, dec("0.5"), false).unwrap();
        repo.apply_disposal(&plan).await.expect("disposal failed");

        let reloaded = PositionLedger::from_lots(repo.load_lots().await.unwrap());
        assert_eq!(reloaded.summary(), ledger.summary());
        assert_eq!(reloaded.total(Pool::Trading), dec("0.3"));
        assert_eq!(reloaded.total(Pool::Core), dec("0.4"));
    }

    #[tokio::test]
    async fn test_commit_decision_is_combined() {
        let (repo, _temp) = setup_test_db().await;

        let mut ledger = PositionLedger::new();
        let first = ledger
            .deposit(dec("1.0"), dec("40000"), TimeMs::new(1000), dec("0.4"), None)
            .unwrap();
        repo.insert_lots(&first.lots().cloned().collect::<Vec<_>>())
            .await
            .unwrap();

        let plan = ledger.dispose(Pool::Trading, dec("1"), false).unwrap();
        let bought = ledger
            .deposit(dec("0.01"), dec("60000"), TimeMs::new(2000), dec("0.4"), None)
            .unwrap();
        let obs = ValuationObservation::new(TimeMs::new(2000), 2.5);

        repo.commit_decision(
            &bought.lots().cloned().collect::<Vec<_>>(),
            Some(&plan),
            Some(&obs),
        )
        .await
        .expect("commit failed");

        let reloaded = PositionLedger::from_lots(repo.load_lots().await.unwrap());
        assert_eq!(reloaded.summary(), ledger.summary());
        let window = repo.query_valuation_window(10).await.unwrap();
        assert_eq!(window, vec![obs]);
    }

    #[tokio::test]
    async fn test_duplicate_observation_ignored() {
        let (repo, _temp) = setup_test_db().await;

        let obs = ValuationObservation::new(TimeMs::new(1000), 2.5);
        assert!(repo.insert_valuation_observation(&obs).await.unwrap());
        assert!(!repo.insert_valuation_observation(&obs).await.unwrap());
    }

    #[tokio::test]
    async fn test_valuation_window_is_trailing_and_ordered() {
        let (repo, _temp) = setup_test_db().await;

        let observations: Vec<ValuationObservation> = (0..30)
            .map(|i| ValuationObservation::new(TimeMs::new(i * 1000), i as f64 * 0.1))
            .collect();
        let inserted = repo.insert_valuation_batch(&observations).await.unwrap();
        assert_eq!(inserted, 30);

        let window = repo.query_valuation_window(21).await.unwrap();
        assert_eq!(window.len(), 21);
        assert_eq!(window.first().unwrap().time_ms, TimeMs::new(9000));
        assert_eq!(window.last().unwrap().time_ms, TimeMs::new(29000));
        assert!(window.windows(2).all(|w| w[0].time_ms < w[1].time_ms));
    }
}
