//! Migrator - walks the revision chain against a schema target

use crate::config::MigrationConfig;
use crate::migration::chain::PlannedStep;
use crate::migration::lock::MigrationLockGuard;
use crate::migration::status::RevisionSummary;
use crate::migration::{
    Direction, DowngradeHazard, MemoryTarget, MigrationError, MigrationRecord, MigrationStatus,
    RevisionChain, SchemaManager, SchemaTarget,
};
use chrono::Utc;
use std::time::Instant;

/// Knobs of a migration run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratorOptions {
    /// Seconds to wait for the run-level lock
    pub lock_timeout_seconds: u64,
    /// Run downgrades that destroy data
    pub allow_lossy: bool,
}

impl Default for MigratorOptions {
    fn default() -> Self {
        Self {
            lock_timeout_seconds: 60,
            allow_lossy: false,
        }
    }
}

impl From<&MigrationConfig> for MigratorOptions {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            lock_timeout_seconds: config.lock_timeout_seconds,
            allow_lossy: false,
        }
    }
}

/// A committed step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedStep {
    pub revision: String,
    pub direction: Direction,
    pub execution_time_ms: i64,
}

/// Outcome of `upgrade`/`downgrade`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub from: Option<String>,
    pub to: Option<String>,
    pub steps: Vec<AppliedStep>,
}

impl RunSummary {
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Result of replaying one revision `up`, `down`, `up` on the in-memory catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRoundTrip {
    pub revision: String,
    /// `down()` restored the schema `up()` started from
    pub reversible: bool,
    /// Re-running `up()` reproduced the same schema
    pub repeatable: bool,
}

/// Report of [`Migrator::verify_round_trips`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundTripReport {
    pub head: Option<String>,
    pub steps: Vec<StepRoundTrip>,
    /// head back to base left an empty schema
    pub returns_to_base: bool,
}

impl RoundTripReport {
    pub fn is_ok(&self) -> bool {
        self.returns_to_base && self.steps.iter().all(|s| s.reversible && s.repeatable)
    }
}

/// Core migration execution engine
///
/// Every run holds the migration lock, executes each step in its own
/// transaction and only ever applies a step when the Current Revision is the
/// one the step builds on.
pub struct Migrator {
    chain: RevisionChain,
    options: MigratorOptions,
}

impl Migrator {
    pub fn new(chain: RevisionChain) -> Self {
        Self {
            chain,
            options: MigratorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MigratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn chain(&self) -> &RevisionChain {
        &self.chain
    }

    pub fn options(&self) -> &MigratorOptions {
        &self.options
    }

    /// Read the Current Revision
    ///
    /// Read-only: a database without bookkeeping tables is at base.
    pub fn current(&self, target: &dyn SchemaTarget) -> Result<Option<String>, MigrationError> {
        Ok(target.current_revision()?)
    }

    /// Applied and pending revisions relative to the Current Revision
    pub fn status(&self, target: &dyn SchemaTarget) -> Result<MigrationStatus, MigrationError> {
        let current = self.current(target)?;

        let applied = match current.as_deref() {
            Some(revision) => {
                let mut line = self.chain.ancestors(revision)?;
                line.reverse();
                line.into_iter().map(RevisionSummary::from).collect()
            }
            None => Vec::new(),
        };

        let mut pending = Vec::new();
        for migration in self.chain.iter() {
            if Some(migration.revision()) == current.as_deref() {
                continue;
            }
            if self
                .chain
                .is_ancestor_or_self(current.as_deref(), Some(migration.revision()))?
            {
                pending.push(RevisionSummary::from(migration));
            }
        }

        let heads = self.chain.heads().into_iter().map(str::to_string).collect();
        let history = target.history()?;

        Ok(MigrationStatus::new(current, heads, applied, pending, history))
    }

    /// Resolve `spec` against `current` and the steps that reach it
    pub fn plan(
        &self,
        current: Option<&str>,
        spec: &str,
    ) -> Result<(Option<String>, Vec<PlannedStep<'_>>), MigrationError> {
        let destination = self.chain.resolve_target(spec, current)?;
        let plan = self.chain.resolve_path(current, destination.as_deref())?;
        Ok((destination, plan))
    }

    /// Hazards of the downgrade steps in `plan`
    ///
    /// # Errors
    ///
    /// `LossyDowngrade` when there are any and lossy downgrades are not allowed.
    pub fn check_hazards(
        &self,
        plan: &[PlannedStep<'_>],
    ) -> Result<Vec<DowngradeHazard>, MigrationError> {
        let hazards: Vec<DowngradeHazard> = plan
            .iter()
            .filter(|step| step.direction == Direction::Down)
            .flat_map(|step| step.migration.downgrade_hazards())
            .collect();

        if hazards.is_empty() {
            return Ok(hazards);
        }
        if !self.options.allow_lossy {
            return Err(MigrationError::LossyDowngrade { hazards });
        }
        for hazard in &hazards {
            log::warn!("Lossy downgrade confirmed: {}", hazard);
        }
        Ok(hazards)
    }

    /// Upgrade to `spec` (default `head`)
    ///
    /// # Errors
    ///
    /// `DirectionMismatch` if reaching `spec` needs a downgrade, plus every
    /// error a step can raise.
    pub fn upgrade(
        &self,
        target: &dyn SchemaTarget,
        spec: &str,
    ) -> Result<RunSummary, MigrationError> {
        self.run(target, spec, Direction::Up)
    }

    /// Downgrade to `spec`
    ///
    /// # Errors
    ///
    /// `DirectionMismatch` if reaching `spec` needs an upgrade,
    /// `LossyDowngrade` if a step destroys data and `allow_lossy` is off,
    /// plus every error a step can raise.
    pub fn downgrade(
        &self,
        target: &dyn SchemaTarget,
        spec: &str,
    ) -> Result<RunSummary, MigrationError> {
        self.run(target, spec, Direction::Down)
    }

    fn run(
        &self,
        target: &dyn SchemaTarget,
        spec: &str,
        requested: Direction,
    ) -> Result<RunSummary, MigrationError> {
        let _lock = MigrationLockGuard::new(target, Some(self.options.lock_timeout_seconds))?;
        let current = self.current(target)?;
        let (destination, plan) = self.plan(current.as_deref(), spec)?;

        if plan.iter().any(|step| step.direction != requested) {
            return Err(MigrationError::DirectionMismatch {
                requested,
                target: spec.to_string(),
                current,
            });
        }
        self.check_hazards(&plan)?;

        if plan.is_empty() {
            log::info!(
                "Already at {}; nothing to do",
                destination.as_deref().unwrap_or("base")
            );
            return Ok(RunSummary {
                from: current,
                to: destination,
                steps: Vec::new(),
            });
        }

        target.prepare()?;
        let mut steps = Vec::with_capacity(plan.len());
        for step in &plan {
            steps.push(self.execute_step(target, step)?);
        }

        Ok(RunSummary {
            from: current,
            to: destination,
            steps,
        })
    }

    /// Apply exactly one revision in one direction
    ///
    /// Unlike `upgrade`/`downgrade` no path is resolved: the step runs only if
    /// the Current Revision is the one it expects.
    pub fn apply_step(
        &self,
        target: &dyn SchemaTarget,
        revision: &str,
        direction: Direction,
    ) -> Result<AppliedStep, MigrationError> {
        let migration = self
            .chain
            .get(revision)
            .ok_or_else(|| MigrationError::UnknownRevision(revision.to_string()))?;
        let step = PlannedStep {
            migration,
            direction,
        };

        let _lock = MigrationLockGuard::new(target, Some(self.options.lock_timeout_seconds))?;
        self.check_hazards(std::slice::from_ref(&step))?;
        target.prepare()?;
        self.execute_step(target, &step)
    }

    /// Set the Current Revision without running any DDL
    pub fn stamp(
        &self,
        target: &dyn SchemaTarget,
        spec: &str,
    ) -> Result<Option<String>, MigrationError> {
        let _lock = MigrationLockGuard::new(target, Some(self.options.lock_timeout_seconds))?;
        let current = self.current(target)?;
        let destination = self.chain.resolve_target(spec, current.as_deref())?;

        target.prepare()?;
        target.begin()?;
        if let Err(e) = target.stamp(destination.as_deref()) {
            self.rollback(target);
            return Err(e.into());
        }
        target.commit()?;

        log::info!(
            "Stamped {} (was {})",
            destination.as_deref().unwrap_or("base"),
            current.as_deref().unwrap_or("base")
        );
        Ok(destination)
    }

    fn execute_step(
        &self,
        target: &dyn SchemaTarget,
        step: &PlannedStep<'_>,
    ) -> Result<AppliedStep, MigrationError> {
        target.begin()?;
        match self.execute_in_transaction(target, step) {
            Ok(applied) => {
                target.commit()?;
                log::info!(
                    "Applied {} {} ({}) in {}ms",
                    applied.direction,
                    applied.revision,
                    step.migration.description(),
                    applied.execution_time_ms
                );
                Ok(applied)
            }
            Err(e) => {
                self.rollback(target);
                Err(e)
            }
        }
    }

    fn execute_in_transaction(
        &self,
        target: &dyn SchemaTarget,
        step: &PlannedStep<'_>,
    ) -> Result<AppliedStep, MigrationError> {
        let found = target.current_revision()?;
        let expected = step.expected_current();
        if found.as_deref() != expected {
            return Err(MigrationError::RevisionMismatch {
                revision: step.revision().to_string(),
                direction: step.direction,
                expected: expected.map(str::to_string),
                found,
            });
        }

        if step.direction == Direction::Up {
            for dependency in step.migration.depends_on() {
                if !self
                    .chain
                    .is_ancestor_or_self(Some(*dependency), found.as_deref())?
                {
                    return Err(MigrationError::UnmetDependency {
                        revision: step.revision().to_string(),
                        dependency: dependency.to_string(),
                    });
                }
            }
        }

        log::debug!("Running {} {}", step.direction, step.revision());
        let start = Instant::now();
        let manager = SchemaManager::new(target);
        let result = match step.direction {
            Direction::Up => step.migration.up(&manager),
            Direction::Down => step.migration.down(&manager),
        };
        result.map_err(|source| MigrationError::DdlExecution {
            revision: step.revision().to_string(),
            direction: step.direction,
            source,
        })?;
        let execution_time_ms = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);

        target.stamp(step.resulting_revision())?;
        target.record(&MigrationRecord::new(
            step.revision().to_string(),
            step.direction,
            Utc::now(),
            Some(execution_time_ms),
        ))?;

        Ok(AppliedStep {
            revision: step.revision().to_string(),
            direction: step.direction,
            execution_time_ms,
        })
    }

    fn rollback(&self, target: &dyn SchemaTarget) {
        if let Err(e) = target.rollback() {
            log::error!("Rollback failed: {}", e);
        }
    }

    /// Replay the whole chain on a fresh in-memory catalog
    ///
    /// Walks base to head applying each revision `up`, `down` and `up` again,
    /// then downgrades back to base. Lossy downgrades are allowed: only the
    /// schema is compared, never rows.
    pub fn verify_round_trips(&self) -> Result<RoundTripReport, MigrationError> {
        let target = MemoryTarget::new();
        let empty = target.snapshot();
        let head = self.chain.head()?.map(str::to_string);

        let mut steps = Vec::new();
        for step in self.chain.resolve_path(None, head.as_deref())? {
            let before = target.snapshot();
            self.execute_step(&target, &step)?;
            let after = target.snapshot();

            let down = PlannedStep {
                migration: step.migration,
                direction: Direction::Down,
            };
            self.execute_step(&target, &down)?;
            let reversible = target.snapshot() == before;

            self.execute_step(&target, &step)?;
            let repeatable = target.snapshot() == after;

            steps.push(StepRoundTrip {
                revision: step.revision().to_string(),
                reversible,
                repeatable,
            });
        }

        for step in self.chain.resolve_path(head.as_deref(), None)? {
            self.execute_step(&target, &step)?;
        }

        Ok(RoundTripReport {
            head,
            steps,
            returns_to_base: target.snapshot() == empty,
        })
    }
}
