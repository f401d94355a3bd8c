//! Per-test rule files (`test.opt`).
//!
//! A rule file sits next to a test descriptor and gates the test on the
//! run's discriminants: it yields a dead/live verdict plus keyed overrides
//! (alternate expected output, timeout limit, failure expectations).
//!
//! Format, one rule per line:
//!
//! ```text
//! TAG[,TAG...] [CMD [ARGUMENT...]]
//! ```
//!
//! A rule matches when every positive tag is in the discriminant set and no
//! `!`-negated tag is; `ALL` always matches. Commands are `DEAD`, `OUT`,
//! `LIMIT`, `XFAIL` and `FAILED`. For each command the matching rule with
//! the most tags wins; ties go to the later line. Evaluation is a pure
//! function of the discriminant set over the parsed-once rule list.

use std::path::Path;

use tracing::warn;

use crate::discriminants::Discriminants;
use crate::errors::SuiteResult;

/// Rule commands, i.e. the keys a rule file can set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKey {
    Dead,
    Out,
    Limit,
    Xfail,
    Failed,
}

impl RuleKey {
    fn parse(word: &str) -> Option<RuleKey> {
        match word.to_ascii_uppercase().as_str() {
            "DEAD" => Some(RuleKey::Dead),
            "OUT" => Some(RuleKey::Out),
            "LIMIT" => Some(RuleKey::Limit),
            "XFAIL" => Some(RuleKey::Xfail),
            "FAILED" => Some(RuleKey::Failed),
            _ => None,
        }
    }
}

/// One tag of a rule's gate, possibly negated.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TagMatch {
    Present(String),
    Absent(String),
}

#[derive(Debug, Clone)]
struct Rule {
    tags: Vec<TagMatch>,
    key: RuleKey,
    argument: String,
    line: usize,
}

impl Rule {
    fn matches(&self, discs: &Discriminants) -> bool {
        self.tags.iter().all(|tag| match tag {
            TagMatch::Present(t) => t == "ALL" || discs.contains(t),
            TagMatch::Absent(t) => !discs.contains(t),
        })
    }

    /// Specificity used for precedence: number of tags, then position.
    fn rank(&self) -> (usize, usize) {
        (self.tags.len(), self.line)
    }
}

/// A parsed rule file.
#[derive(Debug, Clone, Default)]
pub struct RuleFile {
    rules: Vec<Rule>,
}

/// Outcome of evaluating a rule file under a discriminant set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleVerdict {
    /// Test excluded from this run.
    pub dead: bool,
    /// Alternate expected-output filename.
    pub out: Option<String>,
    /// Timeout override, seconds.
    pub limit: Option<u64>,
    /// Expected-failure comment; presence implies the xfail flag.
    pub xfail: Option<String>,
    /// Free-form failure comment, independent of xfail.
    pub failed: Option<String>,
}

impl RuleFile {
    /// Parse rule text. Unknown commands are skipped with a warning rather
    /// than failing the run.
    pub fn parse(text: &str) -> RuleFile {
        let mut rules = Vec::new();

        for (line, raw) in text.lines().enumerate() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("--") {
                continue;
            }

            let mut words = trimmed.splitn(2, char::is_whitespace);
            let tag_list = words.next().unwrap_or_default();
            let rest = words.next().unwrap_or("").trim();

            let tags = tag_list
                .split(',')
                .filter(|t| !t.is_empty())
                .map(|t| match t.strip_prefix('!') {
                    Some(neg) => TagMatch::Absent(neg.to_string()),
                    None => TagMatch::Present(t.to_string()),
                })
                .collect::<Vec<_>>();
            if tags.is_empty() {
                continue;
            }

            // A bare tag list with no command contributes nothing.
            if rest.is_empty() {
                continue;
            }

            let mut words = rest.splitn(2, char::is_whitespace);
            let cmd = words.next().unwrap_or_default();
            let argument = words.next().unwrap_or("").trim().to_string();

            match RuleKey::parse(cmd) {
                Some(key) => rules.push(Rule {
                    tags,
                    key,
                    argument,
                    line,
                }),
                None => warn!("ignoring unknown rule command '{cmd}' at line {}", line + 1),
            }
        }

        RuleFile { rules }
    }

    /// Load the rule file next to a test descriptor. An absent file yields
    /// an empty rule list, i.e. an unconditionally live test.
    pub fn load(test_dir: &Path) -> SuiteResult<RuleFile> {
        let path = test_dir.join("test.opt");
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(RuleFile::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RuleFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Evaluate the rules under the given discriminant set.
    pub fn evaluate(&self, discs: &Discriminants) -> RuleVerdict {
        let mut verdict = RuleVerdict::default();

        for key in [
            RuleKey::Dead,
            RuleKey::Out,
            RuleKey::Limit,
            RuleKey::Xfail,
            RuleKey::Failed,
        ] {
            let winner = self
                .rules
                .iter()
                .filter(|r| r.key == key && r.matches(discs))
                .max_by_key(|r| r.rank());

            let Some(rule) = winner else { continue };

            match key {
                RuleKey::Dead => verdict.dead = true,
                RuleKey::Out => verdict.out = Some(rule.argument.clone()),
                RuleKey::Limit => match rule.argument.parse::<u64>() {
                    Ok(limit) => verdict.limit = Some(limit),
                    Err(_) => warn!(
                        "ignoring unparsable LIMIT value '{}' at line {}",
                        rule.argument,
                        rule.line + 1
                    ),
                },
                RuleKey::Xfail => verdict.xfail = Some(rule.argument.clone()),
                RuleKey::Failed => verdict.failed = Some(rule.argument.clone()),
            }
        }

        verdict
    }
}
