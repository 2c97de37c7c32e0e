use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::path::PathBuf;

use super::walker::WalkIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Downloaded,
    Duplicate,
    Updated,
    Collision,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Downloaded,
        Outcome::Duplicate,
        Outcome::Updated,
        Outcome::Collision,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Downloaded => "downloaded",
            Outcome::Duplicate => "duplicate",
            Outcome::Updated => "updated",
            Outcome::Collision => "collision",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-outcome counters. Adding tallies is associative and commutative, so
/// per-page totals can be folded in any grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub downloaded: usize,
    pub duplicate: usize,
    pub updated: usize,
    pub collision: usize,
    pub failed: usize,
}

impl Tally {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Downloaded => self.downloaded += 1,
            Outcome::Duplicate => self.duplicate += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Collision => self.collision += 1,
        }
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        match outcome {
            Outcome::Downloaded => self.downloaded,
            Outcome::Duplicate => self.duplicate,
            Outcome::Updated => self.updated,
            Outcome::Collision => self.collision,
        }
    }

    pub fn total(&self) -> usize {
        self.downloaded + self.duplicate + self.updated + self.collision + self.failed
    }
}

impl Add for Tally {
    type Output = Tally;

    fn add(self, rhs: Tally) -> Tally {
        Tally {
            downloaded: self.downloaded + rhs.downloaded,
            duplicate: self.duplicate + rhs.duplicate,
            updated: self.updated + rhs.updated,
            collision: self.collision + rhs.collision,
            failed: self.failed + rhs.failed,
        }
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, rhs: Tally) {
        *self = *self + rhs;
    }
}

impl Sum for Tally {
    fn sum<I: Iterator<Item = Tally>>(iter: I) -> Tally {
        iter.fold(Tally::default(), Add::add)
    }
}

impl FromIterator<Outcome> for Tally {
    fn from_iter<I: IntoIterator<Item = Outcome>>(iter: I) -> Self {
        let mut tally = Tally::default();
        for outcome in iter {
            tally.record(outcome);
        }
        tally
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionReport {
    pub locator: String,
    pub path: PathBuf,
    /// The file in the way already holds the same bytes.
    pub identical: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub locator: String,
    pub display_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub tally: Tally,
    pub collisions: Vec<CollisionReport>,
    pub failures: Vec<FailureReport>,
    pub walk_issues: Vec<WalkIssue>,
    pub skipped_pages: Vec<String>,
}

impl RunSummary {
    pub fn merge(&mut self, other: RunSummary) {
        self.tally += other.tally;
        self.collisions.extend(other.collisions);
        self.failures.extend(other.failures);
        self.walk_issues.extend(other.walk_issues);
        self.skipped_pages.extend(other.skipped_pages);
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "All done! Here are the stats:")?;
        for outcome in Outcome::ALL {
            writeln!(f, "  {}: {}", outcome.label(), self.tally.count(outcome))?;
        }
        writeln!(f, "  failed: {}", self.tally.failed)?;

        if !self.collisions.is_empty() {
            writeln!(
                f,
                "Some files could not be saved because another file was in the way:"
            )?;
            for collision in &self.collisions {
                let note = if collision.identical {
                    " (same content)"
                } else {
                    ""
                };
                writeln!(f, "  ~ \"{}\"{note}", collision.path.display())?;
            }
            writeln!(f, "Move or rename those files and run again to fetch them.")?;
        }

        if !self.failures.is_empty() {
            writeln!(f, "These files could not be fetched:")?;
            for failure in &self.failures {
                writeln!(
                    f,
                    "  ! {} ({}): {}",
                    failure.display_name, failure.locator, failure.reason
                )?;
            }
        }

        if !self.skipped_pages.is_empty() {
            writeln!(f, "Skipped pages: {}", self.skipped_pages.join(", "))?;
        }

        if !self.walk_issues.is_empty() {
            writeln!(f, "Some pages could not be read completely:")?;
            for issue in &self.walk_issues {
                writeln!(f, "  * {issue}")?;
            }
        }
        Ok(())
    }
}
