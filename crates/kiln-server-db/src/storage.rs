// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job storage engine.
//!
//! Every state transition of a job is a write through [`JobStorage`]. Moving a
//! record between the queue and history tables always happens inside a single
//! transaction, so a tracking id is visible in exactly one table at a time.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::fmt;

use kiln_jobs_core::{
	CancellationToken, JobRecord, JobState, LogEntry, QueueId, RecordError, TrackingId,
};

use crate::error::{DbError, Result};

const RECORD_COLUMNS: &str = "tracking_id, queue_id, work_command_json, work_result_json, \
	work_log_json_lines, tries, execute_after, expire_on, is_complete, is_cancelled, started_on, \
	finished_on, created_on, created_by_user_id, created_by_display_name";

const STALE_MESSAGE: &str = "Job automatically cancelled due to staleness.";

/// The two physical tables a record can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTable {
	Queue,
	History,
}

impl JobTable {
	pub fn name(&self) -> &'static str {
		match self {
			JobTable::Queue => "job_queue",
			JobTable::History => "job_history",
		}
	}

	pub fn for_record(record: &JobRecord) -> Self {
		if record.is_terminal() {
			JobTable::History
		} else {
			JobTable::Queue
		}
	}
}

impl fmt::Display for JobTable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// How failed executions are rescheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub backoff: Duration,
	/// Attempts after which a failing job is cancelled instead of retried.
	/// `None` retries forever.
	pub max_tries: Option<u32>,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			backoff: Duration::minutes(1),
			max_tries: None,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
	/// Unclaimed rows cancelled because they passed `expire_on`.
	pub expired: u64,
	/// Finished rows moved from the queue table into history.
	pub archived: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
	pub queued: u64,
	pub running: u64,
	pub archived: u64,
}

#[derive(sqlx::FromRow)]
struct JobRecordRow {
	tracking_id: String,
	queue_id: String,
	work_command_json: String,
	work_result_json: String,
	work_log_json_lines: String,
	tries: i64,
	execute_after: String,
	expire_on: String,
	is_complete: bool,
	is_cancelled: bool,
	started_on: Option<String>,
	finished_on: Option<String>,
	created_on: String,
	created_by_user_id: Option<String>,
	created_by_display_name: Option<String>,
}

impl TryFrom<JobRecordRow> for JobRecord {
	type Error = DbError;

	fn try_from(row: JobRecordRow) -> Result<Self> {
		Ok(JobRecord {
			tracking_id: row
				.tracking_id
				.parse()
				.map_err(|e: uuid::Error| RecordError::InvalidId {
					value: row.tracking_id.clone(),
					message: e.to_string(),
				})?,
			queue_id: row.queue_id.parse()?,
			work_command_json: row.work_command_json,
			work_result_json: row.work_result_json,
			work_log_json_lines: row.work_log_json_lines,
			tries: u32::try_from(row.tries).map_err(|_| RecordError::InvalidTries(row.tries))?,
			execute_after: parse_timestamp(&row.execute_after)?,
			expire_on: parse_timestamp(&row.expire_on)?,
			is_complete: row.is_complete,
			is_cancelled: row.is_cancelled,
			started_on: row.started_on.as_deref().map(parse_timestamp).transpose()?,
			finished_on: row.finished_on.as_deref().map(parse_timestamp).transpose()?,
			created_on: parse_timestamp(&row.created_on)?,
			created_by_user_id: row.created_by_user_id,
			created_by_display_name: row.created_by_display_name,
		})
	}
}

/// Timestamps are stored as fixed-width RFC 3339 UTC strings so that SQL
/// string comparison matches time order.
fn format_timestamp(at: &DateTime<Utc>) -> String {
	at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| {
			DbError::Record(RecordError::InvalidTimestamp {
				value: value.to_string(),
				message: e.to_string(),
			})
		})
}

fn now() -> DateTime<Utc> {
	Utc::now().trunc_subsecs(6)
}

/// Writes `record` into `table`, updating the row if present.
///
/// Queue writes are conditional on the job not being archived yet, so a stale
/// copy can never bring a finished job back. Returns `false` when the write
/// was skipped for that reason.
async fn write_record(conn: &mut SqliteConnection, table: JobTable, record: &JobRecord) -> Result<bool> {
	let tracking_id = record.tracking_id.to_string();
	let not_archived = match table {
		JobTable::Queue => "AND NOT EXISTS (SELECT 1 FROM job_history WHERE tracking_id = ?)",
		JobTable::History => "",
	};

	let update_sql = format!(
		r#"
		UPDATE {table}
		SET queue_id = ?,
			work_command_json = ?,
			work_result_json = ?,
			work_log_json_lines = ?,
			tries = ?,
			execute_after = ?,
			expire_on = ?,
			is_complete = ?,
			is_cancelled = ?,
			started_on = ?,
			finished_on = ?,
			created_on = ?,
			created_by_user_id = ?,
			created_by_display_name = ?
		WHERE tracking_id = ? {not_archived}
		"#
	);
	let mut update = sqlx::query(&update_sql)
		.bind(record.queue_id.as_str())
		.bind(&record.work_command_json)
		.bind(&record.work_result_json)
		.bind(&record.work_log_json_lines)
		.bind(i64::from(record.tries))
		.bind(format_timestamp(&record.execute_after))
		.bind(format_timestamp(&record.expire_on))
		.bind(record.is_complete)
		.bind(record.is_cancelled)
		.bind(record.started_on.as_ref().map(format_timestamp))
		.bind(record.finished_on.as_ref().map(format_timestamp))
		.bind(format_timestamp(&record.created_on))
		.bind(&record.created_by_user_id)
		.bind(&record.created_by_display_name)
		.bind(&tracking_id);
	if table == JobTable::Queue {
		update = update.bind(&tracking_id);
	}
	if update.execute(&mut *conn).await?.rows_affected() > 0 {
		return Ok(true);
	}

	let insert_sql = format!(
		r#"
		INSERT INTO {table} ({RECORD_COLUMNS})
		SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
		WHERE 1 = 1 {not_archived}
		"#
	);
	let mut insert = sqlx::query(&insert_sql)
		.bind(&tracking_id)
		.bind(record.queue_id.as_str())
		.bind(&record.work_command_json)
		.bind(&record.work_result_json)
		.bind(&record.work_log_json_lines)
		.bind(i64::from(record.tries))
		.bind(format_timestamp(&record.execute_after))
		.bind(format_timestamp(&record.expire_on))
		.bind(record.is_complete)
		.bind(record.is_cancelled)
		.bind(record.started_on.as_ref().map(format_timestamp))
		.bind(record.finished_on.as_ref().map(format_timestamp))
		.bind(format_timestamp(&record.created_on))
		.bind(&record.created_by_user_id)
		.bind(&record.created_by_display_name);
	if table == JobTable::Queue {
		insert = insert.bind(&tracking_id);
	}

	Ok(insert.execute(&mut *conn).await?.rows_affected() > 0)
}

#[derive(Clone)]
pub struct JobStorage {
	pool: SqlitePool,
	retry_policy: RetryPolicy,
}

impl JobStorage {
	pub fn new(pool: SqlitePool) -> Self {
		Self {
			pool,
			retry_policy: RetryPolicy::default(),
		}
	}

	pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
		self.retry_policy = retry_policy;
		self
	}

	pub fn retry_policy(&self) -> RetryPolicy {
		self.retry_policy
	}

	/// Looks a record up in both tables. A miss is `Ok(None)`.
	#[tracing::instrument(skip(self), fields(tracking_id = %tracking_id))]
	pub async fn get_record(&self, tracking_id: &TrackingId) -> Result<Option<JobRecord>> {
		let id = tracking_id.to_string();
		let row = sqlx::query_as::<_, JobRecordRow>(&format!(
			r#"
			SELECT {RECORD_COLUMNS} FROM job_queue WHERE tracking_id = ?
			UNION ALL
			SELECT {RECORD_COLUMNS} FROM job_history WHERE tracking_id = ?
			LIMIT 1
			"#
		))
		.bind(&id)
		.bind(&id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	/// Looks a record up in the queue table only.
	#[tracing::instrument(skip(self), fields(tracking_id = %tracking_id))]
	pub async fn get_queued_record(&self, tracking_id: &TrackingId) -> Result<Option<JobRecord>> {
		let row = sqlx::query_as::<_, JobRecordRow>(&format!(
			"SELECT {RECORD_COLUMNS} FROM job_queue WHERE tracking_id = ?"
		))
		.bind(tracking_id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	/// Writes `record` to the table its terminal flags select.
	///
	/// Terminal records are removed from the queue table in the same
	/// transaction. Does nothing when `cancellation` is already set.
	#[tracing::instrument(skip(self, record, cancellation), fields(tracking_id = %record.tracking_id))]
	pub async fn persist(&self, record: &JobRecord, cancellation: &CancellationToken) -> Result<()> {
		if cancellation.is_cancelled() {
			tracing::debug!("cancellation requested, skipping persist");
			return Ok(());
		}

		let result = self.persist_in_transaction(record).await;
		if let Err(e) = &result {
			tracing::error!(
				tracking_id = %record.tracking_id,
				error = %e,
				"failed to persist job record"
			);
		}
		result
	}

	async fn persist_in_transaction(&self, record: &JobRecord) -> Result<()> {
		let table = JobTable::for_record(record);
		let mut tx = self.pool.begin().await?;

		if table == JobTable::History {
			sqlx::query("DELETE FROM job_queue WHERE tracking_id = ?")
				.bind(record.tracking_id.to_string())
				.execute(&mut *tx)
				.await?;
		}
		if !write_record(&mut tx, table, record).await? {
			tracing::warn!(
				tracking_id = %record.tracking_id,
				"job is already archived, discarding stale queue write"
			);
		}

		tx.commit().await?;
		Ok(())
	}

	/// Claims up to `limit` runnable jobs, oldest first.
	///
	/// Selection and stamping happen in one conditional `UPDATE … RETURNING`,
	/// so a row is handed to at most one caller even with concurrent claimers.
	#[tracing::instrument(skip(self))]
	pub async fn claim_batch(
		&self,
		queue_id: Option<&QueueId>,
		limit: u32,
		now: DateTime<Utc>,
	) -> Result<Vec<JobRecord>> {
		if limit == 0 {
			return Ok(Vec::new());
		}

		let now = format_timestamp(&now);
		let queue_id = queue_id.map(QueueId::as_str);
		let rows = sqlx::query_as::<_, JobRecordRow>(&format!(
			r#"
			UPDATE job_queue
			SET started_on = ?
			WHERE tracking_id IN (
				SELECT tracking_id FROM job_queue
				WHERE started_on IS NULL
					AND execute_after <= ?
					AND (? IS NULL OR queue_id = ?)
				ORDER BY created_on ASC
				LIMIT ?
			)
			AND started_on IS NULL
			RETURNING {RECORD_COLUMNS}
			"#
		))
		.bind(&now)
		.bind(&now)
		.bind(queue_id)
		.bind(queue_id)
		.bind(i64::from(limit))
		.fetch_all(&self.pool)
		.await?;

		let mut records = rows
			.into_iter()
			.map(JobRecord::try_from)
			.collect::<Result<Vec<_>>>()?;
		records.sort_by(|a, b| a.created_on.cmp(&b.created_on));

		if !records.is_empty() {
			tracing::debug!(claimed = records.len(), "claimed job batch");
		}
		Ok(records)
	}

	#[tracing::instrument(skip(self, record, cancellation), fields(tracking_id = %record.tracking_id))]
	pub async fn complete(&self, record: &mut JobRecord, cancellation: &CancellationToken) -> Result<()> {
		record.mark_complete(now());
		self.persist(record, cancellation).await
	}

	/// Cancels a job that is still in the queue table.
	///
	/// Returns `false` without writing when the job is not queued (unknown,
	/// already finished or already archived).
	#[tracing::instrument(skip(self, cancellation), fields(tracking_id = %tracking_id))]
	pub async fn cancel(&self, tracking_id: &TrackingId, cancellation: &CancellationToken) -> Result<bool> {
		if cancellation.is_cancelled() {
			return Ok(false);
		}

		let Some(mut record) = self.get_queued_record(tracking_id).await? else {
			tracing::debug!("job not in queue, nothing to cancel");
			return Ok(false);
		};

		record.mark_cancelled(now());
		self.persist(&record, cancellation).await?;
		tracing::info!("job cancelled");
		Ok(true)
	}

	/// Returns a failed job to the queue with a delayed `execute_after`.
	///
	/// When the retry policy has a ceiling and this failure reaches it, the
	/// job is cancelled and archived instead.
	#[tracing::instrument(skip(self, record, cancellation), fields(tracking_id = %record.tracking_id))]
	pub async fn fail_and_reschedule(
		&self,
		record: &mut JobRecord,
		cause: &str,
		cancellation: &CancellationToken,
	) -> Result<JobState> {
		tracing::error!(
			tracking_id = %record.tracking_id,
			cause,
			"rescheduling job due to execution failure"
		);

		let now = now();
		record.reschedule_after_failure(now, self.retry_policy.backoff, cause)?;

		if let Some(max_tries) = self.retry_policy.max_tries {
			if record.tries >= max_tries {
				record.append_log(&LogEntry::error(
					now,
					format!("Job abandoned after {} failed attempts.", record.tries),
				))?;
				record.mark_cancelled(now);
				tracing::warn!(
					tracking_id = %record.tracking_id,
					tries = record.tries,
					"job exhausted its retries"
				);
			}
		}

		self.persist(record, cancellation).await?;
		Ok(record.state())
	}

	/// Cancels expired unclaimed jobs, then archives every finished row still
	/// in the queue table. Runs as one transaction.
	#[tracing::instrument(skip(self))]
	pub async fn purge_stale(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
		let log_line = LogEntry::info(now, STALE_MESSAGE).to_line()?;
		let now = format_timestamp(&now);

		let mut tx = self.pool.begin().await?;

		let expired = sqlx::query(
			r#"
			UPDATE job_queue
			SET is_cancelled = 1,
				finished_on = ?,
				work_log_json_lines = work_log_json_lines || ?
			WHERE is_complete = 0
				AND started_on IS NULL
				AND expire_on <= ?
			"#,
		)
		.bind(&now)
		.bind(&log_line)
		.bind(&now)
		.execute(&mut *tx)
		.await?
		.rows_affected();

		sqlx::query(&format!(
			r#"
			INSERT OR REPLACE INTO job_history ({RECORD_COLUMNS})
			SELECT {RECORD_COLUMNS} FROM job_queue
			WHERE finished_on IS NOT NULL
			"#
		))
		.execute(&mut *tx)
		.await?;

		let archived = sqlx::query("DELETE FROM job_queue WHERE finished_on IS NOT NULL")
			.execute(&mut *tx)
			.await?
			.rows_affected();

		tx.commit().await?;

		if expired > 0 || archived > 0 {
			tracing::info!(expired, archived, "purged stale jobs");
		}
		Ok(PurgeReport { expired, archived })
	}

	#[tracing::instrument(skip(self))]
	pub async fn queue_stats(&self) -> Result<QueueStats> {
		let (queued, running): (i64, i64) = sqlx::query_as(
			r#"
			SELECT
				COALESCE(SUM(CASE WHEN started_on IS NULL THEN 1 ELSE 0 END), 0),
				COALESCE(SUM(CASE WHEN started_on IS NOT NULL THEN 1 ELSE 0 END), 0)
			FROM job_queue
			"#,
		)
		.fetch_one(&self.pool)
		.await?;

		let (archived,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM job_history")
			.fetch_one(&self.pool)
			.await?;

		Ok(QueueStats {
			queued: queued.max(0) as u64,
			running: running.max(0) as u64,
			archived: archived.max(0) as u64,
		})
	}

	/// Cheap round trip used by health checks.
	pub async fn ping(&self) -> Result<()> {
		sqlx::query("SELECT 1").execute(&self.pool).await?;
		Ok(())
	}
}

#[async_trait]
pub trait JobStore: Send + Sync {
	async fn get_record(&self, tracking_id: &TrackingId) -> Result<Option<JobRecord>>;
	async fn get_queued_record(&self, tracking_id: &TrackingId) -> Result<Option<JobRecord>>;
	async fn persist(&self, record: &JobRecord, cancellation: &CancellationToken) -> Result<()>;
	async fn claim_batch(
		&self,
		queue_id: Option<&QueueId>,
		limit: u32,
		now: DateTime<Utc>,
	) -> Result<Vec<JobRecord>>;
	async fn complete(&self, record: &mut JobRecord, cancellation: &CancellationToken) -> Result<()>;
	async fn cancel(&self, tracking_id: &TrackingId, cancellation: &CancellationToken) -> Result<bool>;
	async fn fail_and_reschedule(
		&self,
		record: &mut JobRecord,
		cause: &str,
		cancellation: &CancellationToken,
	) -> Result<JobState>;
	async fn purge_stale(&self, now: DateTime<Utc>) -> Result<PurgeReport>;
	async fn queue_stats(&self) -> Result<QueueStats>;
	async fn ping(&self) -> Result<()>;
}

#[async_trait]
impl JobStore for JobStorage {
	async fn get_record(&self, tracking_id: &TrackingId) -> Result<Option<JobRecord>> {
		self.get_record(tracking_id).await
	}

	async fn get_queued_record(&self, tracking_id: &TrackingId) -> Result<Option<JobRecord>> {
		self.get_queued_record(tracking_id).await
	}

	async fn persist(&self, record: &JobRecord, cancellation: &CancellationToken) -> Result<()> {
		self.persist(record, cancellation).await
	}

	async fn claim_batch(
		&self,
		queue_id: Option<&QueueId>,
		limit: u32,
		now: DateTime<Utc>,
	) -> Result<Vec<JobRecord>> {
		self.claim_batch(queue_id, limit, now).await
	}

	async fn complete(&self, record: &mut JobRecord, cancellation: &CancellationToken) -> Result<()> {
		self.complete(record, cancellation).await
	}

	async fn cancel(&self, tracking_id: &TrackingId, cancellation: &CancellationToken) -> Result<bool> {
		self.cancel(tracking_id, cancellation).await
	}

	async fn fail_and_reschedule(
		&self,
		record: &mut JobRecord,
		cause: &str,
		cancellation: &CancellationToken,
	) -> Result<JobState> {
		self.fail_and_reschedule(record, cause, cancellation).await
	}

	async fn purge_stale(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
		self.purge_stale(now).await
	}

	async fn queue_stats(&self) -> Result<QueueStats> {
		self.queue_stats().await
	}

	async fn ping(&self) -> Result<()> {
		self.ping().await
	}
}
