use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{error, info};

use crate::config::ScheduleSettings;
use crate::db;
use crate::error::{Error, Result};
use crate::extract::ApodSource;
use crate::transform::{transform, ApodFields};

pub const DAG_ID: &str = "apod_etl";

/// A node of the run graph, as handed to an external scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct Stage {
    pub name: &'static str,
    pub upstream: &'static [&'static str],
}

/// Declaration order is execution order.
pub const STAGES: &[Stage] = &[
    Stage { name: "ensure_schema", upstream: &[] },
    Stage { name: "extract", upstream: &["ensure_schema"] },
    Stage { name: "transform", upstream: &["extract"] },
    Stage { name: "load", upstream: &["transform"] },
];

/// Every upstream must name a stage declared earlier in the list.
pub fn validate_stages(stages: &[Stage]) -> Result<()> {
    let mut seen = HashSet::new();
    for stage in stages {
        for up in stage.upstream {
            if seen.contains(up) {
                continue;
            }
            let msg = if stages.iter().any(|s| s.name == *up) {
                format!("stage {} depends on {}, which is declared after it", stage.name, up)
            } else {
                format!("stage {} depends on unknown stage {}", stage.name, up)
            };
            return Err(Error::Configuration(msg));
        }
        if !seen.insert(stage.name) {
            return Err(Error::Configuration(format!("duplicate stage {}", stage.name)));
        }
    }
    Ok(())
}

/// Printed by `apod_etl stages`.
#[derive(Debug, Serialize)]
pub struct StageGraph<'a> {
    pub dag_id: &'static str,
    pub schedule: &'a ScheduleSettings,
    pub stages: &'static [Stage],
}

impl<'a> StageGraph<'a> {
    pub fn new(schedule: &'a ScheduleSettings) -> Result<Self> {
        validate_stages(STAGES)?;
        Ok(StageGraph {
            dag_id: DAG_ID,
            schedule,
            stages: STAGES,
        })
    }
}

// ── Run ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Init,
    Extracting,
    Transforming,
    Loading,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Init => "init",
            RunState::Extracting => "extracting",
            RunState::Transforming => "transforming",
            RunState::Loading => "loading",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub row_id: i64,
    pub fields: ApodFields,
}

/// One pass of schema → extract → transform → load. Not reusable: a new
/// attempt is a new `PipelineRun`.
pub struct PipelineRun {
    run_id: String,
    state: RunState,
    history: Vec<RunState>,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRun {
    pub fn new() -> Self {
        PipelineRun {
            run_id: new_run_id(Utc::now()),
            state: RunState::Init,
            history: vec![RunState::Init],
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub async fn execute<S: ApodSource>(
        &mut self,
        conn: &Connection,
        source: &S,
    ) -> Result<RunOutcome> {
        if self.state != RunState::Init {
            return Err(Error::Configuration(format!(
                "{} already finished as {}",
                self.run_id, self.state
            )));
        }

        let t0 = Instant::now();
        let result = self.steps(conn, source).await;
        match &result {
            Ok(outcome) => info!(
                "[{}] stored row {} for {} in {:.2}s",
                self.run_id,
                outcome.row_id,
                outcome.fields.date,
                t0.elapsed().as_secs_f64()
            ),
            Err(e) => {
                error!("[{}] failed while {}: {}", self.run_id, self.state, e);
                self.advance(RunState::Failed);
            }
        }
        result
    }

    async fn steps<S: ApodSource>(&mut self, conn: &Connection, source: &S) -> Result<RunOutcome> {
        db::ensure_schema(conn)?;

        self.advance(RunState::Extracting);
        let raw = source.fetch().await?;

        self.advance(RunState::Transforming);
        let fields = transform(&raw);

        self.advance(RunState::Loading);
        let row_id = db::insert_record(conn, &fields)?;

        self.advance(RunState::Done);
        Ok(RunOutcome {
            run_id: self.run_id.clone(),
            row_id,
            fields,
        })
    }

    fn advance(&mut self, next: RunState) {
        info!("[{}] {} -> {}", self.run_id, self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

fn new_run_id(at: DateTime<Utc>) -> String {
    format!("run-{}", at.format("%Y%m%dT%H%M%SZ"))
}
