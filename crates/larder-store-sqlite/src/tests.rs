//! Integration tests for `SqliteStore` against in-memory and temp-file
//! databases.

use std::time::Duration;

use larder_core::{
  food::{NewFood, NutrientField, Nutrients, SourceTier},
  quality::{Regression, ScoringWeights},
  status::EnrichmentStatus,
  store::{ClaimPolicy, Enrichment, FoodQuery, FoodSelector, FoodStore},
};
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn policy() -> ClaimPolicy {
  ClaimPolicy {
    max_attempts:  3,
    claim_timeout: Duration::from_secs(600),
  }
}

fn queued(name: &str) -> NewFood {
  NewFood { enqueue: true, ..NewFood::new(name) }
}

fn enrichment(nutrients: Nutrients, quality_score: u8) -> Enrichment {
  Enrichment {
    nutrients,
    data_sources: Some(SourceTier::Foundation.label().to_owned()),
    reference_id: Some(171077),
    match_score: Some(90),
    quality_score,
    suspect: false,
  }
}

fn chicken_panel() -> Nutrients {
  Nutrients {
    calories: Some(120.0),
    protein_g: Some(22.5),
    fat_g: Some(2.62),
    sodium_mg: Some(45.0),
    ..Default::default()
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_get_food() {
  let s = store().await;

  let mut input = NewFood::new("Milk, whole");
  input.brand = Some("Dairy Co".into());
  input.nutrients.calories = Some(61.0);
  let food = s.insert_food(input).await.unwrap();

  assert_eq!(food.status, EnrichmentStatus::Unset);
  assert_eq!(food.commonness_score, 100);

  let fetched = s.get_food(food.food_id).await.unwrap().unwrap();
  assert_eq!(fetched.name, "Milk, whole");
  assert_eq!(fetched.brand.as_deref(), Some("Dairy Co"));
  assert_eq!(fetched.nutrients.calories, Some(61.0));
  assert_eq!(fetched.nutrients.protein_g, None);
  assert_eq!(fetched.created_at, food.created_at);
}

#[tokio::test]
async fn get_food_missing_returns_none() {
  let s = store().await;
  assert!(s.get_food(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn list_orders_by_commonness() {
  let s = store().await;
  s.insert_food(NewFood::new("Bison steak")).await.unwrap();
  s.insert_food(NewFood::new("Milk, whole")).await.unwrap();
  s.insert_food(NewFood::new("Mystery stew")).await.unwrap();

  let all = s.list_foods(&FoodQuery::default()).await.unwrap();
  let names: Vec<_> = all.iter().map(|f| f.name.as_str()).collect();
  assert_eq!(names, ["Milk, whole", "Mystery stew", "Bison steak"]);

  let page = s
    .list_foods(&FoodQuery { limit: Some(1), offset: Some(1), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(page[0].name, "Mystery stew");
}

// ─── Queue ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn enqueue_moves_only_unset_records() {
  let s = store().await;
  let a = s.insert_food(NewFood::new("Apple")).await.unwrap();
  let b = s.insert_food(NewFood::new("Banana")).await.unwrap();
  s.insert_food(queued("Carrot")).await.unwrap();

  let moved = s.enqueue(&FoodSelector::Ids(vec![a.food_id])).await.unwrap();
  assert_eq!(moved, 1);
  assert_eq!(
    s.get_food(b.food_id).await.unwrap().unwrap().status,
    EnrichmentStatus::Unset
  );

  assert_eq!(s.enqueue(&FoodSelector::All).await.unwrap(), 1);
  assert_eq!(s.enqueue(&FoodSelector::All).await.unwrap(), 0);
}

#[tokio::test]
async fn claim_is_exclusive() {
  let s = store().await;
  let food = s.insert_food(queued("Chicken Breast")).await.unwrap();

  let claimed = s.claim(food.food_id, "w1", policy()).await.unwrap().unwrap();
  assert_eq!(claimed.status, EnrichmentStatus::Processing);
  assert_eq!(claimed.claimed_by.as_deref(), Some("w1"));
  assert_eq!(claimed.attempt_count, 1);

  assert!(s.claim(food.food_id, "w2", policy()).await.unwrap().is_none());
}

#[tokio::test]
async fn unset_and_completed_records_are_not_claimable() {
  let s = store().await;
  let unset = s.insert_food(NewFood::new("Tofu")).await.unwrap();
  assert!(s.claim(unset.food_id, "w1", policy()).await.unwrap().is_none());

  let food = s.insert_food(queued("Tofu")).await.unwrap();
  s.claim(food.food_id, "w1", policy()).await.unwrap().unwrap();
  assert!(s.complete(food.food_id, "w1", enrichment(chicken_panel(), 80)).await.unwrap());
  assert!(s.claim(food.food_id, "w2", policy()).await.unwrap().is_none());
  assert!(s.claimable(10, policy()).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_exactly_one_winner() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("larder.db");

  // One connection per simulated worker, opened up front.
  let mut stores = vec![];
  for _ in 0..8 {
    stores.push(SqliteStore::open(&path).await.unwrap());
  }
  let food = stores[0].insert_food(queued("Chicken Breast")).await.unwrap();

  let mut handles = vec![];
  for (i, s) in stores.into_iter().enumerate() {
    let id = food.food_id;
    handles.push(tokio::spawn(async move {
      s.claim(id, &format!("w{i}"), policy()).await.unwrap().is_some()
    }));
  }

  let mut winners = 0;
  for h in handles {
    if h.await.unwrap() {
      winners += 1;
    }
  }
  assert_eq!(winners, 1);

  let s = SqliteStore::open(&path).await.unwrap();
  let after = s.get_food(food.food_id).await.unwrap().unwrap();
  assert_eq!(after.attempt_count, 1);
}

#[tokio::test]
async fn claimable_is_oldest_first_and_bounded() {
  let s = store().await;
  let first = s.insert_food(queued("Apple")).await.unwrap();
  let second = s.insert_food(queued("Banana")).await.unwrap();
  s.insert_food(queued("Carrot")).await.unwrap();

  let ids = s.claimable(2, policy()).await.unwrap();
  assert_eq!(ids, vec![first.food_id, second.food_id]);
}

#[tokio::test]
async fn complete_requires_calories() {
  let s = store().await;
  let food = s.insert_food(queued("Water")).await.unwrap();
  s.claim(food.food_id, "w1", policy()).await.unwrap().unwrap();

  let err = s
    .complete(food.food_id, "w1", enrichment(Nutrients::default(), 80))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(larder_core::Error::MissingCalories(id)) if id == food.food_id));
}

#[tokio::test]
async fn complete_writes_enrichment_and_clears_claim() {
  let s = store().await;
  let food = s.insert_food(queued("Chicken Breast")).await.unwrap();
  s.claim(food.food_id, "w1", policy()).await.unwrap().unwrap();

  assert!(s.complete(food.food_id, "w1", enrichment(chicken_panel(), 74)).await.unwrap());

  let done = s.get_food(food.food_id).await.unwrap().unwrap();
  assert_eq!(done.status, EnrichmentStatus::Completed);
  assert_eq!(done.quality_score, Some(74));
  assert_eq!(done.nutrients.protein_g, Some(22.5));
  assert_eq!(done.data_sources.as_deref(), Some("USDA-Foundation"));
  assert_eq!(done.reference_id, Some(171077));
  assert!(done.last_enrichment.is_some());
  assert!(done.claimed_by.is_none());
}

#[tokio::test]
async fn only_the_claim_holder_may_finish() {
  let s = store().await;
  let food = s.insert_food(queued("Chicken Breast")).await.unwrap();
  s.claim(food.food_id, "w1", policy()).await.unwrap().unwrap();

  assert!(!s.complete(food.food_id, "w2", enrichment(chicken_panel(), 80)).await.unwrap());
  assert!(!s.fail(food.food_id, "w2", "no candidates").await.unwrap());
  assert_eq!(
    s.get_food(food.food_id).await.unwrap().unwrap().status,
    EnrichmentStatus::Processing
  );
}

#[tokio::test]
async fn failed_records_retry_until_max_attempts() {
  let s = store().await;
  let food = s.insert_food(queued("Zzyzx root")).await.unwrap();
  let policy = ClaimPolicy { max_attempts: 2, ..policy() };

  for attempt in 1..=2 {
    let claimed = s.claim(food.food_id, "w1", policy).await.unwrap().unwrap();
    assert_eq!(claimed.attempt_count, attempt);
    assert!(s.fail(food.food_id, "w1", "no candidates").await.unwrap());
  }

  let failed = s.get_food(food.food_id).await.unwrap().unwrap();
  assert_eq!(failed.status, EnrichmentStatus::Failed);
  assert_eq!(failed.failure_reason.as_deref(), Some("no candidates"));
  assert!(s.claim(food.food_id, "w1", policy).await.unwrap().is_none());
  assert!(s.claimable(10, policy).await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_claims_can_be_taken_over() {
  let s = store().await;
  let food = s.insert_food(queued("Chicken Breast")).await.unwrap();
  s.claim(food.food_id, "w1", policy()).await.unwrap().unwrap();

  // Not stale under the normal timeout.
  assert!(s.claim(food.food_id, "w2", policy()).await.unwrap().is_none());

  tokio::time::sleep(Duration::from_millis(5)).await;
  let expired = ClaimPolicy { claim_timeout: Duration::ZERO, ..policy() };
  let taken = s.claim(food.food_id, "w2", expired).await.unwrap().unwrap();
  assert_eq!(taken.claimed_by.as_deref(), Some("w2"));
  assert_eq!(taken.attempt_count, 2);

  // The original worker lost its claim.
  assert!(!s.complete(food.food_id, "w1", enrichment(chicken_panel(), 80)).await.unwrap());
}

#[tokio::test]
async fn release_stale_returns_abandoned_claims_to_pending() {
  let s = store().await;
  let food = s.insert_food(queued("Chicken Breast")).await.unwrap();
  s.claim(food.food_id, "w1", policy()).await.unwrap().unwrap();

  assert_eq!(s.release_stale(Duration::from_secs(600)).await.unwrap(), 0);

  tokio::time::sleep(Duration::from_millis(5)).await;
  assert_eq!(s.release_stale(Duration::ZERO).await.unwrap(), 1);

  let released = s.get_food(food.food_id).await.unwrap().unwrap();
  assert_eq!(released.status, EnrichmentStatus::Pending);
  assert_eq!(released.failure_reason.as_deref(), Some("claim expired"));
  assert!(released.claimed_by.is_none());
}

// ─── Operator sweeps ─────────────────────────────────────────────────────────

async fn completed(s: &SqliteStore, name: &str, nutrients: Nutrients, score: u8) -> Uuid {
  let food = s.insert_food(queued(name)).await.unwrap();
  s.claim(food.food_id, "w1", policy()).await.unwrap().unwrap();
  assert!(s.complete(food.food_id, "w1", enrichment(nutrients, score)).await.unwrap());
  food.food_id
}

fn full_panel(calories: f64, protein: f64, carbs: f64, fat: f64) -> Nutrients {
  let mut n = Nutrients {
    calories: Some(calories),
    protein_g: Some(protein),
    carbs_g: Some(carbs),
    fat_g: Some(fat),
    ..Default::default()
  };
  for field in NutrientField::micronutrients() {
    n.set(field, Some(1.0));
  }
  n
}

#[tokio::test]
async fn quality_sweep_regresses_calorie_corruption() {
  let s = store().await;
  let sprouts = completed(&s, "Brussels Sprouts", full_panel(500.0, 3.4, 9.0, 0.3), 100).await;
  let good = completed(&s, "Brussels Sprouts, raw", full_panel(43.0, 3.4, 9.0, 0.3), 100).await;

  let report = s.quality_sweep(&ScoringWeights::default(), 70).await.unwrap();
  assert_eq!(report.examined, 2);
  assert_eq!(report.regressed, vec![(sprouts, Regression::CalorieMismatch)]);

  let bad = s.get_food(sprouts).await.unwrap().unwrap();
  assert_eq!(bad.status, EnrichmentStatus::Pending);
  assert_eq!(bad.failure_reason.as_deref(), Some("calorie/macro mismatch"));
  assert!(bad.suspect);
  assert_eq!(bad.quality_score, Some(50));

  let ok = s.get_food(good).await.unwrap().unwrap();
  assert_eq!(ok.status, EnrichmentStatus::Completed);

  // Re-running finds nothing new.
  let again = s.quality_sweep(&ScoringWeights::default(), 70).await.unwrap();
  assert_eq!(again.examined, 1);
  assert!(again.regressed.is_empty());
}

#[tokio::test]
async fn quality_sweep_leaves_records_rewritten_after_scoring() {
  let s = store().await;
  let id = completed(&s, "Brussels Sprouts", full_panel(500.0, 3.4, 9.0, 0.3), 100).await;
  let weights = ScoringWeights::default();

  let plan = s.plan_sweep(&weights, 70).await.unwrap();

  // The record is reprocessed and enriched again before the plan is written.
  assert_eq!(s.reprocess(&FoodSelector::Ids(vec![id])).await.unwrap(), 1);
  s.claim(id, "w2", policy()).await.unwrap().unwrap();
  let fresh = enrichment(full_panel(43.0, 3.4, 9.0, 0.3), 100);
  assert!(s.complete(id, "w2", fresh).await.unwrap());

  let report = s.apply_sweep(plan).await.unwrap();
  assert_eq!(report.examined, 1);
  assert!(report.regressed.is_empty());

  let food = s.get_food(id).await.unwrap().unwrap();
  assert_eq!(food.status, EnrichmentStatus::Completed);
  assert_eq!(food.nutrients.calories, Some(43.0));
  assert_eq!(food.quality_score, Some(100));
  assert!(!food.suspect);
  assert_eq!(food.failure_reason, None);
}

#[tokio::test]
async fn quality_sweep_regresses_incomplete_records() {
  let s = store().await;
  let sparse = Nutrients { calories: Some(120.0), ..Default::default() };
  let id = completed(&s, "Chicken Breast", sparse, 90).await;

  let report = s.quality_sweep(&ScoringWeights::default(), 70).await.unwrap();
  assert_eq!(report.regressed, vec![(id, Regression::LowQuality)]);
  let food = s.get_food(id).await.unwrap().unwrap();
  assert_eq!(food.failure_reason.as_deref(), Some("quality below threshold"));
}

#[tokio::test]
async fn reprocess_clears_enrichment() {
  let s = store().await;
  let id = completed(&s, "Chicken Breast", chicken_panel(), 80).await;
  let untouched = s.insert_food(queued("Apple")).await.unwrap();

  let reset = s
    .reprocess(&FoodSelector::DataSource("USDA-Foundation".into()))
    .await
    .unwrap();
  assert_eq!(reset, 1);

  let food = s.get_food(id).await.unwrap().unwrap();
  assert_eq!(food.status, EnrichmentStatus::Pending);
  assert!(NutrientField::iter().all(|f| food.nutrients.get(f).is_none()));
  assert_eq!(food.quality_score, None);
  assert_eq!(food.data_sources, None);
  assert_eq!(food.reference_id, None);
  assert_eq!(food.attempt_count, 0);

  let other = s.get_food(untouched.food_id).await.unwrap().unwrap();
  assert_eq!(other.status, EnrichmentStatus::Pending);
}

#[tokio::test]
async fn reprocess_skips_processing_records() {
  let s = store().await;
  let food = s.insert_food(queued("Chicken Breast")).await.unwrap();
  s.claim(food.food_id, "w1", policy()).await.unwrap().unwrap();

  assert_eq!(s.reprocess(&FoodSelector::All).await.unwrap(), 0);
  assert_eq!(
    s.reprocess(&FoodSelector::NameLike("%chicken%".into())).await.unwrap(),
    0
  );
}

#[tokio::test]
async fn reprocess_by_status_and_name() {
  let s = store().await;
  s.insert_food(NewFood::new("Chicken thigh")).await.unwrap();
  s.insert_food(NewFood::new("Beef brisket")).await.unwrap();

  let n = s.reprocess(&FoodSelector::NameLike("chicken%".into())).await.unwrap();
  assert_eq!(n, 1);
  let n = s
    .reprocess(&FoodSelector::Status(EnrichmentStatus::Unset))
    .await
    .unwrap();
  assert_eq!(n, 1);
}

#[tokio::test]
async fn rerank_only_counts_changes() {
  let s = store().await;
  s.insert_food(NewFood::new("Milk, whole")).await.unwrap();
  s.insert_food(NewFood::new("Bison steak")).await.unwrap();
  assert_eq!(s.rerank().await.unwrap(), 0);
}

// ─── Rollup ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rollup_counts_status_source_and_quality() {
  let s = store().await;
  assert!(s.latest_rollup().await.unwrap().is_none());

  completed(&s, "Chicken Breast", chicken_panel(), 80).await;
  completed(&s, "Turkey breast", chicken_panel(), 60).await;
  s.insert_food(queued("Apple")).await.unwrap();
  s.insert_food(NewFood::new("Banana")).await.unwrap();

  let rollup = s.refresh_rollup().await.unwrap();
  assert_eq!(rollup.total, 4);
  assert_eq!(rollup.count(EnrichmentStatus::Completed), 2);
  assert_eq!(rollup.count(EnrichmentStatus::Pending), 1);
  assert_eq!(rollup.count(EnrichmentStatus::Unset), 1);
  assert_eq!(rollup.count(EnrichmentStatus::Failed), 0);
  assert_eq!(rollup.by_source.get("USDA-Foundation"), Some(&2));
  assert_eq!(rollup.avg_quality, Some(70.0));
  assert_eq!(rollup.suspect_count, 0);

  let cached = s.latest_rollup().await.unwrap().unwrap();
  assert_eq!(cached, rollup);
}
