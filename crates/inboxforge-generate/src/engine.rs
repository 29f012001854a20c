use std::path::{Path, PathBuf};
use std::time::Instant;

use rusqlite::Connection;
use tracing::{info, warn};

use inboxforge_core::{DATASET_VERSION, SchemaLayout};

use crate::config::GenerationConfig;
use crate::derived::DerivedSummary;
use crate::errors::GenerationError;
use crate::model::{GenerationReport, StoreCounts};
use crate::narrative;
use crate::output::{prepare_output, report_path, write_json_atomic};
use crate::population::{PopulationEngine, PopulationSummary};
use crate::rng::RngContext;
use crate::schema::{SchemaStatus, provision, sources_for};
use crate::writer::MessageWriter;

/// Result of a generation run.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub store_path: PathBuf,
    pub report_path: PathBuf,
    pub report: GenerationReport,
}

/// Entry point for generating a mail archive store from a configuration.
#[derive(Debug, Clone)]
pub struct GenerationEngine {
    config: GenerationConfig,
}

struct BuiltStore {
    schema: SchemaStatus,
    population: PopulationSummary,
    curated_messages: usize,
    derived: DerivedSummary,
    counts: StoreCounts,
}

struct Populated {
    population: PopulationSummary,
    curated_messages: usize,
    derived: DerivedSummary,
}

impl GenerationEngine {
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn run(&self) -> Result<GenerationResult, GenerationError> {
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(
            run_id = %run_id,
            seed = self.config.seed,
            target_messages = self.config.target_messages,
            accounts = self.config.accounts.len(),
            output = %self.config.output.display(),
            "generation started"
        );

        let staged = prepare_output(&self.config.output, &self.config.analytics_dir())?;
        let built = match self.build_store(staged.partial_path()) {
            Ok(built) => built,
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "generation failed; discarding partial store");
                return Err(err);
            }
        };
        let store_path = staged.commit()?;

        let report = GenerationReport {
            run_id: run_id.clone(),
            dataset_version: DATASET_VERSION.to_string(),
            seed: self.config.seed,
            target_messages: self.config.target_messages,
            schema_origin: built.schema.origin,
            schema_location: built.schema.location,
            warnings: built.schema.warnings,
            population: built.population,
            curated_messages: built.curated_messages,
            derived: built.derived,
            counts: built.counts,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        let report_path = report_path(&store_path);
        write_json_atomic(&report_path, &report)?;

        info!(
            run_id = %run_id,
            messages = report.counts.messages,
            conversations = report.counts.conversations,
            participants = report.counts.participants,
            fts_rows = report.counts.fts_rows,
            duration_ms = report.duration_ms,
            store = %store_path.display(),
            "generation completed"
        );

        Ok(GenerationResult {
            store_path,
            report_path,
            report,
        })
    }

    fn build_store(&self, path: &Path) -> Result<BuiltStore, GenerationError> {
        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let schema = provision(&conn, &sources_for(&self.config.schema))?;

        let tx = conn.transaction()?;
        let populated = self.populate(&tx, schema.layout)?;
        tx.commit()?;

        let counts = StoreCounts::collect(&conn)?;
        conn.close().map_err(|(_, err)| err)?;

        Ok(BuiltStore {
            schema,
            population: populated.population,
            curated_messages: populated.curated_messages,
            derived: populated.derived,
            counts,
        })
    }

    fn populate(&self, conn: &Connection, layout: SchemaLayout) -> Result<Populated, GenerationError> {
        let mut rng = RngContext::seeded(self.config.seed)?;
        let engine = PopulationEngine::new(&self.config)?;
        let writer = MessageWriter::new(conn, layout);

        let mut ctx = engine.seed(&writer, &mut rng)?;
        let population = engine.populate(&mut ctx, &writer, &mut rng)?;
        let curated_messages = if self.config.curated_thread {
            narrative::inject(&mut ctx, &writer, &mut rng, self.config.snippet_chars)?
                .message_ids
                .len()
        } else {
            0
        };

        let derived = writer.seal().build_derived()?;
        Ok(Populated {
            population,
            curated_messages,
            derived,
        })
    }
}
