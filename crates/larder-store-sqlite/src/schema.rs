//! SQL schema for the Larder SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS foods (
    food_id           TEXT PRIMARY KEY,
    name              TEXT NOT NULL,
    brand             TEXT,
    category          TEXT,

    -- per 100 g; NULL until enriched
    calories          REAL,
    protein_g         REAL,
    carbs_g           REAL,
    fat_g             REAL,
    fiber_g           REAL,
    sugar_g           REAL,
    sodium_mg         REAL,
    potassium_mg      REAL,
    calcium_mg        REAL,
    iron_mg           REAL,
    magnesium_mg      REAL,
    phosphorus_mg     REAL,
    zinc_mg           REAL,
    vitamin_a_ug      REAL,
    vitamin_c_mg      REAL,
    vitamin_d_ug      REAL,
    vitamin_e_mg      REAL,
    vitamin_k_ug      REAL,
    vitamin_b6_mg     REAL,
    vitamin_b12_ug    REAL,
    folate_ug         REAL,

    enrichment_status TEXT    NOT NULL DEFAULT 'unset',
    quality_score     INTEGER,
    data_sources      TEXT,            -- tier label, e.g. 'USDA-Foundation'
    last_enrichment   TEXT,
    commonness_score  INTEGER NOT NULL DEFAULT 50,
    suspect           INTEGER NOT NULL DEFAULT 0,
    reference_id      INTEGER,         -- FoodData Central fdc_id
    match_score       INTEGER,
    failure_reason    TEXT,

    attempt_count     INTEGER NOT NULL DEFAULT 0,
    claimed_by        TEXT,
    claimed_at        TEXT,            -- fixed-width RFC 3339, compared as text
    created_at        TEXT    NOT NULL,
    updated_at        TEXT    NOT NULL,

    CHECK (enrichment_status IN ('unset', 'pending', 'processing', 'completed', 'failed')),
    CHECK (enrichment_status <> 'completed'
           OR (quality_score IS NOT NULL AND calories IS NOT NULL)),
    CHECK (quality_score IS NULL OR quality_score BETWEEN 0 AND 100),
    CHECK (commonness_score BETWEEN 0 AND 100)
);

CREATE INDEX IF NOT EXISTS foods_queue_idx  ON foods(enrichment_status, updated_at);
CREATE INDEX IF NOT EXISTS foods_source_idx ON foods(data_sources);

-- Single-row cache of the last computed rollup.
CREATE TABLE IF NOT EXISTS pipeline_status (
    id          INTEGER PRIMARY KEY CHECK (id = 1),
    rollup_json TEXT NOT NULL,
    computed_at TEXT NOT NULL
);

PRAGMA user_version = 1;
";
