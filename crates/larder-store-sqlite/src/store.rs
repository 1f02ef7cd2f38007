//! [`SqliteStore`]: the SQLite implementation of [`FoodStore`].

use std::{path::Path, time::Duration};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, types::Value};
use uuid::Uuid;

use larder_core::{
  commonness,
  food::{FoodRecord, NewFood, Nutrients},
  quality::{self, ScoringWeights},
  rollup::PipelineRollup,
  status::{EnrichmentStatus, Transition},
  store::{
    ClaimPolicy, Enrichment, FoodQuery, FoodSelector, FoodStore, SweepReport,
  },
};

use crate::{
  Error, Result,
  encode::{
    RawFood, encode_dt, encode_food, encode_uuid, food_columns, nutrient_values,
    status_list,
  },
  schema::SCHEMA,
};

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure reason written when an abandoned claim is released.
const REASON_CLAIM_EXPIRED: &str = "claim expired";

// ─── SQL fragments ───────────────────────────────────────────────────────────

fn select_foods(tail: &str) -> String {
  format!("SELECT {} FROM foods {tail}", food_columns())
}

/// `enrichment_status IN (…)` for the states `transition` may leave.
fn from_states(transition: Transition) -> String {
  format!(
    "enrichment_status IN ({})",
    status_list(EnrichmentStatus::sources(transition))
  )
}

fn to_state(transition: Transition) -> Value {
  Value::Text(EnrichmentStatus::target(transition).as_str().to_owned())
}

/// Claim guard. Binds two parameters: max attempts, then the stale cutoff.
fn claim_guard() -> String {
  format!(
    "(({claimable}) AND (enrichment_status <> 'failed' OR attempt_count < ?))
     OR (enrichment_status = 'processing' AND claimed_at < ?)",
    claimable = from_states(Transition::Claim),
  )
}

fn claim_guard_params(policy: ClaimPolicy, now: chrono::DateTime<Utc>) -> [Value; 2] {
  [
    Value::Integer(i64::from(policy.max_attempts)),
    Value::Text(encode_dt(policy.stale_before(now))),
  ]
}

/// Selector as a `WHERE` fragment plus its parameters.
fn selector_clause(selector: &FoodSelector) -> (String, Vec<Value>) {
  match selector {
    FoodSelector::All => ("1 = 1".to_owned(), vec![]),
    FoodSelector::Ids(ids) if ids.is_empty() => ("0 = 1".to_owned(), vec![]),
    FoodSelector::Ids(ids) => (
      format!("food_id IN ({})", vec!["?"; ids.len()].join(", ")),
      ids.iter().map(|id| Value::Text(encode_uuid(*id))).collect(),
    ),
    FoodSelector::Status(s) => (
      "enrichment_status = ?".to_owned(),
      vec![Value::Text(s.as_str().to_owned())],
    ),
    FoodSelector::NameLike(pattern) => {
      ("name LIKE ?".to_owned(), vec![Value::Text(pattern.clone())])
    }
    FoodSelector::DataSource(label) => {
      ("data_sources = ?".to_owned(), vec![Value::Text(label.clone())])
    }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Larder food store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Clones share
/// one connection; open the file again for an independent one.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `UPDATE foods SET <sets> WHERE <condition>` and return the number of
  /// rows changed. Placeholders in `condition` are anonymous (`?`) and bound
  /// from `params` after the `SET` values.
  async fn update_where(
    &self,
    sets: Vec<(&'static str, Value)>,
    condition: String,
    params: Vec<Value>,
  ) -> Result<usize> {
    let assignments = sets
      .iter()
      .map(|(column, _)| format!("{column} = ?"))
      .collect::<Vec<_>>()
      .join(", ");
    let sql = format!("UPDATE foods SET {assignments} WHERE {condition}");
    let values: Vec<Value> =
      sets.into_iter().map(|(_, v)| v).chain(params).collect();

    let changed = self
      .conn
      .call(move |conn| Ok(conn.execute(&sql, rusqlite::params_from_iter(values))?))
      .await?;
    Ok(changed)
  }

  async fn query_foods(&self, sql: String, params: Vec<Value>) -> Result<Vec<FoodRecord>> {
    let raws: Vec<RawFood> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawFood::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFood::into_food).collect()
  }

  /// Rescore every completed record without writing anything.
  pub(crate) async fn plan_sweep(
    &self,
    weights: &ScoringWeights,
    threshold: u8,
  ) -> Result<SweepPlan> {
    let completed = self
      .query_foods(
        select_foods(&format!("WHERE {}", from_states(Transition::Regress))),
        vec![],
      )
      .await?;

    let mut plan = SweepPlan { examined: completed.len() as u64, ..Default::default() };
    for record in &completed {
      let scored = quality::score(record, weights);
      let seen = encode_dt(record.updated_at);
      match quality::regression(&scored, threshold) {
        Some(reason) => plan.regress.push(PlannedRegression {
          food_id: record.food_id,
          seen,
          reason,
          score: scored.score,
          suspect: scored.suspect,
        }),
        None if record.quality_score != Some(scored.score)
          || record.suspect != scored.suspect =>
        {
          plan.rescore.push((record.food_id, seen, scored.score, scored.suspect))
        }
        None => {}
      }
    }
    Ok(plan)
  }

  /// Write a sweep plan. Each update only lands on a row whose `updated_at`
  /// still matches the value it was scored from; rows rewritten since then
  /// are left alone and not reported.
  pub(crate) async fn apply_sweep(&self, plan: SweepPlan) -> Result<SweepReport> {
    let now = encode_dt(Utc::now());
    let regress_sql = format!(
      "UPDATE foods
       SET enrichment_status = ?1, failure_reason = ?2, quality_score = ?3,
           suspect = ?4, updated_at = ?5
       WHERE food_id = ?6 AND updated_at = ?7 AND {}",
      from_states(Transition::Regress),
    );
    let rescore_sql = format!(
      "UPDATE foods SET quality_score = ?1, suspect = ?2, updated_at = ?3
       WHERE food_id = ?4 AND updated_at = ?5 AND {}",
      from_states(Transition::Regress),
    );
    let target = EnrichmentStatus::target(Transition::Regress).as_str();
    let SweepPlan { examined, regress, rescore } = plan;

    let regressed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut regressed = Vec::with_capacity(regress.len());
        for r in regress {
          let changed = tx.execute(
            &regress_sql,
            rusqlite::params![
              target,
              r.reason.reason(),
              r.score,
              r.suspect,
              now,
              encode_uuid(r.food_id),
              r.seen
            ],
          )?;
          if changed == 1 {
            regressed.push((r.food_id, r.reason));
          }
        }
        for (id, seen, score, suspect) in &rescore {
          tx.execute(
            &rescore_sql,
            rusqlite::params![score, suspect, now, encode_uuid(*id), seen],
          )?;
        }
        tx.commit()?;
        Ok(regressed)
      })
      .await?;

    Ok(SweepReport { examined, regressed })
  }
}

/// Writes a quality sweep intends to make, each tagged with the `updated_at`
/// it was computed from.
#[derive(Debug, Default)]
pub(crate) struct SweepPlan {
  examined: u64,
  regress:  Vec<PlannedRegression>,
  rescore:  Vec<(Uuid, String, u8, bool)>,
}

#[derive(Debug)]
struct PlannedRegression {
  food_id: Uuid,
  seen:    String,
  reason:  quality::Regression,
  score:   u8,
  suspect: bool,
}

// ─── FoodStore impl ──────────────────────────────────────────────────────────

impl FoodStore for SqliteStore {
  type Error = Error;

  // ── Records ───────────────────────────────────────────────────────────────

  async fn insert_food(&self, input: NewFood) -> Result<FoodRecord> {
    let now = Utc::now();
    let status = if input.enqueue {
      EnrichmentStatus::Unset.transition(Transition::Enqueue)?
    } else {
      EnrichmentStatus::Unset
    };
    let commonness_score = commonness::rank(&input.name, input.category.as_deref());

    let record = FoodRecord {
      food_id: Uuid::new_v4(),
      name: input.name,
      brand: input.brand,
      category: input.category,
      nutrients: input.nutrients,
      status,
      quality_score: None,
      data_sources: None,
      last_enrichment: None,
      commonness_score,
      suspect: false,
      reference_id: None,
      match_score: None,
      failure_reason: None,
      attempt_count: 0,
      claimed_by: None,
      claimed_at: None,
      created_at: now,
      updated_at: now,
    };

    let values = encode_food(&record);
    let columns = values.iter().map(|(c, _)| *c).collect::<Vec<_>>().join(", ");
    let placeholders = vec!["?"; values.len()].join(", ");
    let sql = format!("INSERT INTO foods ({columns}) VALUES ({placeholders})");
    let params: Vec<Value> = values.into_iter().map(|(_, v)| v).collect();

    self
      .conn
      .call(move |conn| {
        conn.execute(&sql, rusqlite::params_from_iter(params))?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn get_food(&self, id: Uuid) -> Result<Option<FoodRecord>> {
    let id_str = encode_uuid(id);
    let sql = select_foods("WHERE food_id = ?1");

    let raw: Option<RawFood> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], RawFood::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawFood::into_food).transpose()
  }

  async fn list_foods(&self, query: &FoodQuery) -> Result<Vec<FoodRecord>> {
    let mut conds: Vec<&'static str> = vec![];
    let mut params: Vec<Value> = vec![];
    if let Some(status) = query.status {
      conds.push("enrichment_status = ?");
      params.push(Value::Text(status.as_str().to_owned()));
    }
    if query.suspect_only {
      conds.push("suspect = 1");
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };
    params.push(Value::Integer(query.limit.unwrap_or(100) as i64));
    params.push(Value::Integer(query.offset.unwrap_or(0) as i64));

    let sql = select_foods(&format!(
      "{where_clause} ORDER BY commonness_score DESC, name ASC LIMIT ? OFFSET ?"
    ));
    self.query_foods(sql, params).await
  }

  // ── Queue ─────────────────────────────────────────────────────────────────

  async fn enqueue(&self, selector: &FoodSelector) -> Result<u64> {
    let (clause, params) = selector_clause(selector);
    let changed = self
      .update_where(
        vec![
          ("enrichment_status", to_state(Transition::Enqueue)),
          ("updated_at", Value::Text(encode_dt(Utc::now()))),
        ],
        format!("{} AND ({clause})", from_states(Transition::Enqueue)),
        params,
      )
      .await?;
    Ok(changed as u64)
  }

  async fn claimable(&self, limit: usize, policy: ClaimPolicy) -> Result<Vec<Uuid>> {
    let sql = format!(
      "SELECT food_id FROM foods
       WHERE {guard}
       ORDER BY updated_at ASC, created_at ASC
       LIMIT ?",
      guard = claim_guard(),
    );
    let mut params = claim_guard_params(policy, Utc::now()).to_vec();
    params.push(Value::Integer(limit as i64));

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    ids
      .iter()
      .map(|s| Uuid::parse_str(s).map_err(Error::Uuid))
      .collect()
  }

  async fn claim(
    &self,
    id: Uuid,
    worker: &str,
    policy: ClaimPolicy,
  ) -> Result<Option<FoodRecord>> {
    let now = Utc::now();
    let now_str = encode_dt(now);
    let id_str = encode_uuid(id);

    let sql = format!(
      "UPDATE foods
       SET enrichment_status = ?,
           claimed_by        = ?,
           claimed_at        = ?,
           updated_at        = ?,
           attempt_count     = attempt_count + 1
       WHERE food_id = ? AND ({guard})",
      guard = claim_guard(),
    );
    let mut params = vec![
      to_state(Transition::Claim),
      Value::Text(worker.to_owned()),
      Value::Text(now_str.clone()),
      Value::Text(now_str),
      Value::Text(id_str),
    ];
    params.extend(claim_guard_params(policy, now));

    let changed = self
      .conn
      .call(move |conn| Ok(conn.execute(&sql, rusqlite::params_from_iter(params))?))
      .await?;

    // Zero rows means another worker got there first, or the record left the
    // claimable states.
    if changed == 0 {
      return Ok(None);
    }
    self.get_food(id).await
  }

  async fn complete(
    &self,
    id: Uuid,
    worker: &str,
    enrichment: Enrichment,
  ) -> Result<bool> {
    if enrichment.nutrients.calories.is_none() {
      return Err(larder_core::Error::MissingCalories(id).into());
    }

    let now = Value::Text(encode_dt(Utc::now()));
    let mut sets = nutrient_values(&enrichment.nutrients);
    sets.extend([
      ("enrichment_status", to_state(Transition::Complete)),
      ("quality_score", Value::Integer(i64::from(enrichment.quality_score))),
      ("suspect", Value::Integer(i64::from(enrichment.suspect))),
      (
        "data_sources",
        enrichment.data_sources.map_or(Value::Null, Value::Text),
      ),
      (
        "reference_id",
        enrichment.reference_id.map_or(Value::Null, Value::Integer),
      ),
      (
        "match_score",
        enrichment
          .match_score
          .map_or(Value::Null, |s| Value::Integer(i64::from(s))),
      ),
      ("failure_reason", Value::Null),
      ("claimed_by", Value::Null),
      ("claimed_at", Value::Null),
      ("last_enrichment", now.clone()),
      ("updated_at", now),
    ]);

    let changed = self
      .update_where(
        sets,
        format!("food_id = ? AND {} AND claimed_by = ?", from_states(Transition::Complete)),
        vec![Value::Text(encode_uuid(id)), Value::Text(worker.to_owned())],
      )
      .await?;
    Ok(changed == 1)
  }

  async fn fail(&self, id: Uuid, worker: &str, reason: &str) -> Result<bool> {
    let changed = self
      .update_where(
        vec![
          ("enrichment_status", to_state(Transition::Fail)),
          ("failure_reason", Value::Text(reason.to_owned())),
          ("claimed_by", Value::Null),
          ("claimed_at", Value::Null),
          ("updated_at", Value::Text(encode_dt(Utc::now()))),
        ],
        format!("food_id = ? AND {} AND claimed_by = ?", from_states(Transition::Fail)),
        vec![Value::Text(encode_uuid(id)), Value::Text(worker.to_owned())],
      )
      .await?;
    Ok(changed == 1)
  }

  async fn release_stale(&self, claim_timeout: Duration) -> Result<u64> {
    let now = Utc::now();
    let policy = ClaimPolicy { max_attempts: 0, claim_timeout };
    let changed = self
      .update_where(
        vec![
          ("enrichment_status", to_state(Transition::Release)),
          ("failure_reason", Value::Text(REASON_CLAIM_EXPIRED.to_owned())),
          ("claimed_by", Value::Null),
          ("claimed_at", Value::Null),
          ("updated_at", Value::Text(encode_dt(now))),
        ],
        format!("{} AND claimed_at < ?", from_states(Transition::Release)),
        vec![Value::Text(encode_dt(policy.stale_before(now)))],
      )
      .await?;
    Ok(changed as u64)
  }

  // ── Operator sweeps ───────────────────────────────────────────────────────

  async fn reprocess(&self, selector: &FoodSelector) -> Result<u64> {
    let (clause, params) = selector_clause(selector);

    let mut sets = nutrient_values(&Nutrients::default());
    sets.extend([
      ("enrichment_status", to_state(Transition::Reprocess)),
      ("quality_score", Value::Null),
      ("suspect", Value::Integer(0)),
      ("data_sources", Value::Null),
      ("reference_id", Value::Null),
      ("match_score", Value::Null),
      ("last_enrichment", Value::Null),
      ("failure_reason", Value::Null),
      ("attempt_count", Value::Integer(0)),
      ("claimed_by", Value::Null),
      ("claimed_at", Value::Null),
      ("updated_at", Value::Text(encode_dt(Utc::now()))),
    ]);

    let changed = self
      .update_where(
        sets,
        format!("{} AND ({clause})", from_states(Transition::Reprocess)),
        params,
      )
      .await?;
    Ok(changed as u64)
  }

  async fn quality_sweep(
    &self,
    weights: &ScoringWeights,
    threshold: u8,
  ) -> Result<SweepReport> {
    let plan = self.plan_sweep(weights, threshold).await?;
    self.apply_sweep(plan).await
  }

  async fn rerank(&self) -> Result<u64> {
    let rows: Vec<(String, String, Option<String>, i64)> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT food_id, name, category, commonness_score FROM foods")?;
        let rows = stmt
          .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let changes: Vec<(String, u8)> = rows
      .into_iter()
      .filter_map(|(id, name, category, current)| {
        let score = commonness::rank(&name, category.as_deref());
        (i64::from(score) != current).then_some((id, score))
      })
      .collect();

    let changed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for (id, score) in &changes {
          tx.execute(
            "UPDATE foods SET commonness_score = ?1 WHERE food_id = ?2",
            rusqlite::params![score, id],
          )?;
        }
        tx.commit()?;
        Ok(changes.len())
      })
      .await?;
    Ok(changed as u64)
  }

  // ── Rollup ────────────────────────────────────────────────────────────────

  async fn refresh_rollup(&self) -> Result<PipelineRollup> {
    type Counts = Vec<(Option<String>, i64)>;

    let (by_status, by_source, avg_quality, suspect, total): (
      Counts,
      Counts,
      Option<f64>,
      Option<i64>,
      i64,
    ) = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT enrichment_status, COUNT(*) FROM foods GROUP BY enrichment_status",
        )?;
        let by_status = stmt
          .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
          "SELECT data_sources, COUNT(*) FROM foods
           WHERE data_sources IS NOT NULL
           GROUP BY data_sources",
        )?;
        let by_source = stmt
          .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let (avg, suspect, total) = conn.query_row(
          "SELECT AVG(quality_score), SUM(suspect), COUNT(*) FROM foods",
          [],
          |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;
        Ok((by_status, by_source, avg, suspect, total))
      })
      .await?;

    let mut rollup = PipelineRollup::empty(Utc::now());
    for (status, count) in by_status {
      if let Some(status) = status {
        rollup.by_status.insert(status, count as u64);
      }
    }
    for (source, count) in by_source {
      if let Some(source) = source {
        rollup.by_source.insert(source, count as u64);
      }
    }
    rollup.avg_quality = avg_quality;
    rollup.suspect_count = suspect.unwrap_or(0) as u64;
    rollup.total = total as u64;

    let json = serde_json::to_string(&rollup)?;
    let computed_at = encode_dt(rollup.computed_at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO pipeline_status (id, rollup_json, computed_at)
           VALUES (1, ?1, ?2)
           ON CONFLICT (id) DO UPDATE
             SET rollup_json = excluded.rollup_json,
                 computed_at = excluded.computed_at",
          rusqlite::params![json, computed_at],
        )?;
        Ok(())
      })
      .await?;

    Ok(rollup)
  }

  async fn latest_rollup(&self) -> Result<Option<PipelineRollup>> {
    let json: Option<String> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT rollup_json FROM pipeline_status WHERE id = 1",
              [],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
  }
}
