//! Discriminant computation.
//!
//! Discriminants are string tags capturing the facts of the current run:
//! platform, qualification mode, compiler flags, runtime-support kind and
//! toolchain version. They are computed once at startup and drive the
//! dead/live evaluation of each test's rule file.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::RunConfig;

/// The immutable, ordered, deduplicated tag set describing one run.
#[derive(Debug, Clone, Default)]
pub struct Discriminants {
    tags: Vec<String>,
}

impl Discriminants {
    /// Compute the full set of discriminants that apply to this run.
    pub fn resolve(config: &RunConfig) -> Self {
        let mut discs = Discriminants::default();

        // Base discriminants: the universal tag plus platform facts.
        discs.push("ALL");
        discs.push(&config.target);
        discs.push(std::env::consts::OS);

        if let Some(level) = config.qualif_level {
            discs.push(&format!("QUALIF_LEVEL_{}", level.id()));
        }

        // One tag per compiler flag supplied through the cargs family of
        // options, stripped of its leading dashes.
        for flag in config.all_cargs() {
            discs.push(&format!("QUALIF_CARGS_{}", flag.trim_start_matches('-')));
        }

        for tag in rts_tags(&config.rts) {
            discs.push(tag);
        }

        if let Some(toolchain) = &config.toolchain {
            if let Some(version) = toolchain_version(&toolchain.to_string_lossy()) {
                discs.push(&version);
            }
        }

        discs
    }

    /// Build a set from explicit tags. Intended for rule evaluation tests
    /// and tools; `resolve` is the production path.
    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut discs = Discriminants::default();
        for tag in tags {
            discs.push(tag.as_ref());
        }
        discs
    }

    fn push(&mut self, tag: &str) {
        if !tag.is_empty() && !self.contains(tag) {
            self.tags.push(tag.to_string());
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tags
    }

    /// Space-joined form, as dumped to the run's `discs` file.
    pub fn join(&self) -> String {
        self.tags.join(" ")
    }
}

/// Runtime-support classification tags for the --RTS selector.
///
/// Priority ordered: the first matching rule wins. A selector containing
/// both "ravenscar" and "sfp" must classify as ravenscar-sfp and never fall
/// through to the ravenscar-full branch.
fn rts_tags(rts: &str) -> &'static [&'static str] {
    // --RTS=zfp is strict zfp, missing malloc, memcmp, memcpy and put
    if rts == "zfp" {
        &["RTS_ZFP_STRICT"]
    // ex --RTS=powerpc-elf/zfp-prep
    } else if rts.contains("zfp") {
        &["RTS_ZFP"]
    // ex --RTS=powerpc-elf/ravenscar-sfp-prep or --RTS=ravenscar-sfp
    } else if ravenscar_sfp(rts) {
        &["RTS_RAVENSCAR", "RTS_RAVENSCAR_SFP"]
    // ex --RTS=powerpc-elf/ravenscar-full-prep or --RTS=ravenscar
    } else if rts.contains("ravenscar") {
        &["RTS_RAVENSCAR", "RTS_RAVENSCAR_FULL"]
    // ex --RTS=native or --RTS=kernel
    } else {
        &["RTS_FULL"]
    }
}

/// "ravenscar" followed by "sfp", anywhere in the selector.
fn ravenscar_sfp(rts: &str) -> bool {
    rts.find("ravenscar")
        .is_some_and(|at| rts[at + "ravenscar".len()..].contains("sfp"))
}

/// Toolchain version extracted from the installation path, for example
/// "7.0.2" out of /path/to/gnatpro-7.0.2. Absence of a match is never an
/// error, the tag is simply omitted.
fn toolchain_version(toolchain: &str) -> Option<String> {
    static VERSION: OnceLock<Regex> = OnceLock::new();
    let re = VERSION.get_or_init(|| {
        Regex::new(r"(\d+\.\d+\.\d+)").expect("INVARIANT: fixed version pattern compiles")
    });
    re.find(toolchain).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rts: &str) -> RunConfig {
        RunConfig {
            target: "powerpc-elf".to_string(),
            rts: rts.to_string(),
            ..RunConfig::default()
        }
    }

    #[test]
    fn strict_zfp_is_exact_match_only() {
        assert_eq!(rts_tags("zfp"), ["RTS_ZFP_STRICT"]);
        assert_eq!(rts_tags("powerpc-elf/zfp-prep"), ["RTS_ZFP"]);
    }

    #[test]
    fn ravenscar_sfp_never_classifies_as_full() {
        assert_eq!(
            rts_tags("powerpc-elf/ravenscar-sfp-prep"),
            ["RTS_RAVENSCAR", "RTS_RAVENSCAR_SFP"]
        );
        assert_eq!(rts_tags("ravenscar-sfp"), ["RTS_RAVENSCAR", "RTS_RAVENSCAR_SFP"]);
    }

    #[test]
    fn ravenscar_alone_is_full() {
        assert_eq!(
            rts_tags("powerpc-elf/ravenscar-full-prep"),
            ["RTS_RAVENSCAR", "RTS_RAVENSCAR_FULL"]
        );
        assert_eq!(rts_tags("ravenscar"), ["RTS_RAVENSCAR", "RTS_RAVENSCAR_FULL"]);
    }

    #[test]
    fn anything_else_is_full_runtime() {
        assert_eq!(rts_tags("native"), ["RTS_FULL"]);
        assert_eq!(rts_tags("kernel"), ["RTS_FULL"]);
    }

    #[test]
    fn toolchain_version_extraction() {
        assert_eq!(
            toolchain_version("/path/to/gnatpro-7.0.2").as_deref(),
            Some("7.0.2")
        );
        assert_eq!(
            toolchain_version("/opt/toolchain-17.1.3/bin").as_deref(),
            Some("17.1.3")
        );
        assert_eq!(toolchain_version("/usr/local/toolchain"), None);
    }

    #[test]
    fn cargs_discriminants_strip_leading_dashes() {
        let mut cfg = config("native");
        cfg.cargs = "-O1".to_string();
        cfg.cargs_lang.insert("Ada".to_string(), "-gnatp".to_string());

        let discs = Discriminants::resolve(&cfg);
        assert!(discs.contains("QUALIF_CARGS_O1"));
        assert!(discs.contains("QUALIF_CARGS_gnatp"));
    }

    #[test]
    fn qualif_level_tag_present_only_in_qualification_mode() {
        use crate::qualif::QualifLevel;

        let discs = Discriminants::resolve(&config("native"));
        assert!(!discs.join().contains("QUALIF_LEVEL"));

        let mut cfg = config("native");
        cfg.qualif_level = Some(QualifLevel::DoB);
        let discs = Discriminants::resolve(&cfg);
        assert!(discs.contains("QUALIF_LEVEL_doB"));
    }

    #[test]
    fn base_tags_and_dedup() {
        let discs = Discriminants::resolve(&config("native"));
        assert_eq!(discs.as_slice()[0], "ALL");
        assert!(discs.contains("powerpc-elf"));

        let mut seen = std::collections::HashSet::new();
        for tag in discs.as_slice() {
            assert!(seen.insert(tag), "duplicated tag {tag}");
        }
    }
}
