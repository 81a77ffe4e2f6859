// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Table definitions for the queue and history tables.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::storage::JobTable;

fn job_table_ddl(table: JobTable) -> String {
	format!(
		r#"
		CREATE TABLE IF NOT EXISTS {table} (
			tracking_id TEXT PRIMARY KEY,
			queue_id TEXT NOT NULL,
			work_command_json TEXT NOT NULL,
			work_result_json TEXT NOT NULL DEFAULT '{{}}',
			work_log_json_lines TEXT NOT NULL DEFAULT '',
			tries INTEGER NOT NULL DEFAULT 0,
			execute_after TEXT NOT NULL,
			expire_on TEXT NOT NULL,
			is_complete INTEGER NOT NULL DEFAULT 0,
			is_cancelled INTEGER NOT NULL DEFAULT 0,
			started_on TEXT,
			finished_on TEXT,
			created_on TEXT NOT NULL,
			created_by_user_id TEXT,
			created_by_display_name TEXT
		)
		"#,
		table = table.name()
	)
}

const INDEXES: &[&str] = &[
	"CREATE INDEX IF NOT EXISTS idx_job_queue_claim ON job_queue(queue_id, started_on, execute_after, created_on)",
	"CREATE INDEX IF NOT EXISTS idx_job_queue_created_on ON job_queue(created_on)",
	"CREATE INDEX IF NOT EXISTS idx_job_queue_expire_on ON job_queue(expire_on)",
	"CREATE INDEX IF NOT EXISTS idx_job_queue_finished_on ON job_queue(finished_on)",
	"CREATE INDEX IF NOT EXISTS idx_job_history_queue_id ON job_history(queue_id, finished_on)",
];

/// Creates the job tables and their indexes. Safe to run on every start.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	let mut tx = pool.begin().await?;

	for table in [JobTable::Queue, JobTable::History] {
		sqlx::query(&job_table_ddl(table))
			.execute(&mut *tx)
			.await?;
	}
	for index in INDEXES {
		sqlx::query(index).execute(&mut *tx).await?;
	}

	tx.commit().await?;
	tracing::debug!("job tables migrated");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	#[tokio::test]
	async fn migrations_are_idempotent() {
		let pool = create_test_pool().await;
		run_migrations(&pool).await.unwrap();
		run_migrations(&pool).await.unwrap();

		let tables: Vec<(String,)> = sqlx::query_as(
			"SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'job_%' ORDER BY name",
		)
		.fetch_all(&pool)
		.await
		.unwrap();
		let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
		assert_eq!(names, vec!["job_history", "job_queue"]);
	}

	#[tokio::test]
	async fn tables_share_columns() {
		let pool = create_test_pool().await;
		run_migrations(&pool).await.unwrap();

		let columns = |table: &'static str| {
			let pool = pool.clone();
			async move {
				let rows: Vec<(String,)> =
					sqlx::query_as(&format!("SELECT name FROM pragma_table_info('{table}')"))
						.fetch_all(&pool)
						.await
						.unwrap();
				rows.into_iter().map(|(n,)| n).collect::<Vec<_>>()
			}
		};

		let queue = columns("job_queue").await;
		assert_eq!(queue.len(), 15);
		assert_eq!(queue, columns("job_history").await);
	}
}
