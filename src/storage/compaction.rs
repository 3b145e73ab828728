//! Compaction
//!
//! Merges every run of level L with the runs of level L+1 that overlap it,
//! streaming the result into one new run of L+1.
//!
//! Planning and merging only read immutable runs, so both run under the
//! level manager's read guard. Swapping the run lists is left to the caller.

use std::collections::BTreeSet;

use crate::error::{LsmError, Result};

use super::level::LevelController;
use super::merge::{MergeIterator, SourceRank};
use super::sstable::{Direction, Keynator, RunWriter, SortedRun};

/// Inputs chosen for one compaction of `level` into `level + 1`
#[derive(Debug, Clone)]
pub struct CompactionPlan {
    pub level: usize,
    /// Every run of `level`
    pub upper: Vec<u64>,
    /// Runs of `level + 1` overlapping the combined input range
    pub lower: Vec<u64>,
    /// No deeper level holds data a tombstone could still be hiding
    pub drop_tombstones: bool,
}

impl CompactionPlan {
    pub fn target_level(&self) -> usize {
        self.level + 1
    }
}

/// Counters for one finished compaction
#[derive(Debug, Clone, Default)]
pub struct CompactionStats {
    pub level: usize,
    pub input_runs: usize,
    pub bytes_in: u64,
    pub records_written: u64,
    pub bytes_out: u64,
    pub tombstones_dropped: u64,
    pub corrupt_skipped: u64,
}

/// Whether `level` has outgrown its byte budget or its run limit
pub fn needs_compaction(level: &LevelController, max_runs_per_level: usize) -> bool {
    level.is_over_budget() || level.run_count() > max_runs_per_level
}

/// Choose the inputs for compacting `level` into the next one
///
/// Returns `None` when the level has no runs. The L+1 selection is closed
/// under overlap: a run overlapping an already chosen run is chosen too, so
/// the output never overlaps a run it does not replace.
pub fn plan(levels: &[LevelController], level: usize) -> Result<Option<CompactionPlan>> {
    if level + 1 >= levels.len() {
        return Err(LsmError::InvalidLevel(level + 1));
    }

    let source = &levels[level];
    let Some((mut first, mut last)) = source.key_range() else {
        return Ok(None);
    };

    let target = &levels[level + 1];
    let mut lower = BTreeSet::new();
    loop {
        let mut grew = false;
        for run in target.runs() {
            if lower.contains(&run.id()) || !run.overlap(&first, &last) {
                continue;
            }
            lower.insert(run.id());
            if run.first_key() < &first {
                first = run.first_key().clone();
            }
            if run.last_key() > &last {
                last = run.last_key().clone();
            }
            grew = true;
        }
        if !grew {
            break;
        }
    }

    let drop_tombstones = levels[level + 2..].iter().all(LevelController::is_empty);

    Ok(Some(CompactionPlan {
        level,
        upper: source.runs().iter().map(SortedRun::id).collect(),
        lower: lower.into_iter().collect(),
        drop_tombstones,
    }))
}

/// Merge the planned inputs into a new run of the target level
///
/// Returns `None` for the run when nothing survived (every input record was a
/// droppable tombstone or corrupt).
pub fn execute(
    plan: &CompactionPlan,
    levels: &[LevelController],
) -> Result<(Option<SortedRun>, CompactionStats)> {
    let source = &levels[plan.level];
    let target = &levels[plan.target_level()];

    let inputs: Vec<(&SortedRun, SourceRank)> = source
        .runs()
        .iter()
        .filter(|run| plan.upper.contains(&run.id()))
        .map(|run| (run, SourceRank::run(plan.level, run.id())))
        .chain(
            target
                .runs()
                .iter()
                .filter(|run| plan.lower.contains(&run.id()))
                .map(|run| (run, SourceRank::run(plan.target_level(), run.id()))),
        )
        .collect();

    let mut stats = CompactionStats {
        level: plan.level,
        input_runs: inputs.len(),
        bytes_in: inputs.iter().map(|(run, _)| run.size_bytes()).sum(),
        ..Default::default()
    };

    let mut sources = Vec::with_capacity(inputs.len());
    for (run, rank) in inputs {
        let mut keynator = Keynator::open(run)?;
        seek_first(&mut keynator, plan.level, &mut stats)?;
        sources.push((keynator, rank));
    }
    let merge = MergeIterator::new(sources, Direction::Forward);

    let (id, files) = target.next_run_files();
    let mut writer = RunWriter::create(id, files)?;

    if let Err(e) = drain_into(merge, &mut writer, plan, &mut stats) {
        writer.abandon()?;
        return Err(e);
    }

    if writer.record_count() == 0 {
        writer.abandon()?;
        return Ok((None, stats));
    }

    let run = writer.finish()?;
    stats.records_written = run.record_count();
    stats.bytes_out = run.size_bytes();
    Ok((Some(run), stats))
}

/// Position a fresh keynator on its first readable key
fn seek_first(keynator: &mut Keynator<'_>, level: usize, stats: &mut CompactionStats) -> Result<()> {
    loop {
        match keynator.next_key() {
            Ok(_) => return Ok(()),
            Err(e) if e.is_corruption() => {
                tracing::warn!(level, error = %e, "skipping corrupt index entry during compaction");
                stats.corrupt_skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn drain_into(
    merge: MergeIterator<Keynator<'_>>,
    writer: &mut RunWriter,
    plan: &CompactionPlan,
    stats: &mut CompactionStats,
) -> Result<()> {
    for item in merge {
        match item {
            Ok(record) if record.is_deleted() && plan.drop_tombstones => {
                stats.tombstones_dropped += 1;
            }
            Ok(record) => writer.write_record(&record)?,
            Err(e) if e.is_corruption() => {
                tracing::warn!(
                    level = plan.level,
                    error = %e,
                    "skipping corrupt record during compaction"
                );
                stats.corrupt_skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
