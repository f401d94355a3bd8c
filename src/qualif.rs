//! Qualification levels and the qualification subtree.
//!
//! The testsuite tree features particular subdirectories hosting the
//! qualification testcases, all under a single root directory. Tests there
//! may run as part of regular testing or for an actual qualification
//! process; the latter restricts the selection to the subtrees relevant for
//! the requested level and forces the corresponding coverage level on every
//! child invocation.

use std::sync::OnceLock;

use regex::Regex;

/// Root directory of the qualification subtree.
pub const QROOTDIR: &str = "Qualif";

/// Languages with dedicated qualification subtrees.
pub const QLANGUAGES: [&str; 2] = ["Ada", "C"];

/// One of the three fixed qualification levels.
///
/// Subtree matchers are not mutually exclusive: stricter levels are
/// supersets of weaker-level criteria directories, so a test may match
/// zero, one or several levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum QualifLevel {
    #[value(name = "doA")]
    DoA,
    #[value(name = "doB")]
    DoB,
    #[value(name = "doC")]
    DoC,
}

impl QualifLevel {
    pub const ALL: [QualifLevel; 3] = [QualifLevel::DoA, QualifLevel::DoB, QualifLevel::DoC];

    /// String identifier, as spelled on the command line and in
    /// discriminant tags.
    pub fn id(self) -> &'static str {
        match self {
            QualifLevel::DoA => "doA",
            QualifLevel::DoB => "doB",
            QualifLevel::DoC => "doC",
        }
    }

    /// Coverage level to pass to the analysis tool for every test run at
    /// this qualification level, whatever criterion the test was designed
    /// to assess.
    pub fn coverage_level(self) -> &'static str {
        match self {
            QualifLevel::DoA => "stmt+mcdc",
            QualifLevel::DoB => "stmt+decision",
            QualifLevel::DoC => "stmt",
        }
    }

    /// Alternation of coverage criteria whose directories hold tests for
    /// this level.
    fn criteria(self) -> &'static str {
        match self {
            QualifLevel::DoA => "stmt|decision|mcdc",
            QualifLevel::DoB => "stmt|decision",
            QualifLevel::DoC => "stmt",
        }
    }

    /// Matcher over test paths for the subtrees holding qualification
    /// tests applicable to this level: the common subdirs, or a language
    /// subdir restricted to this level's criteria.
    pub fn subtree(self) -> &'static Regex {
        static SUBTREES: OnceLock<[Regex; 3]> = OnceLock::new();
        let all = SUBTREES.get_or_init(|| {
            QualifLevel::ALL.map(|level| {
                let pattern = format!(
                    "{root}/((Common|Appendix)|(({langs})/({crit})))",
                    root = QROOTDIR,
                    langs = QLANGUAGES.join("|"),
                    crit = level.criteria(),
                );
                Regex::new(&pattern).expect("INVARIANT: fixed subtree pattern compiles")
            })
        });
        match self {
            QualifLevel::DoA => &all[0],
            QualifLevel::DoB => &all[1],
            QualifLevel::DoC => &all[2],
        }
    }
}
