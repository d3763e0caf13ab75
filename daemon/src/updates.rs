/// Package-upgrade detection for two ecosystems (pip and Chocolatey).
///
/// A check cycle spawns one worker per ecosystem. Each worker lists outdated
/// packages, filters them through the ecosystem's [`UpgradePolicy`], and raises
/// its flag in the shared [`UpdateFlags`] if anything survives. The event loop
/// later consumes the flags with [`UpdateFlags::take`].
///
/// Failures stay local to one ecosystem: a missing tool or a malformed line
/// leaves that ecosystem's flag down and never affects the other worker.
use anyhow::{bail, Result};
use regex::Regex;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{EcosystemConfig, UpdatesConfig};
use crate::external;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ecosystem {
    Pip,
    Choco,
}

impl Ecosystem {
    pub const ALL: [Ecosystem; 2] = [Ecosystem::Pip, Ecosystem::Choco];

    pub fn name(self) -> &'static str {
        match self {
            Ecosystem::Pip => "pip",
            Ecosystem::Choco => "choco",
        }
    }

    pub fn default_command(self) -> Vec<String> {
        let argv: &[&str] = match self {
            Ecosystem::Pip => &["pip", "list", "--outdated"],
            Ecosystem::Choco => &["choco", "outdated", "-r"],
        };
        argv.iter().map(|s| s.to_string()).collect()
    }

    /// `(message, title)` of the notification posted when upgrades are found.
    pub fn notification(self) -> (&'static str, &'static str) {
        match self {
            Ecosystem::Pip => ("Outdated pip packages can be upgraded.", "pip updates available"),
            Ecosystem::Choco => (
                "Outdated Chocolatey packages can be upgraded.",
                "choco updates available",
            ),
        }
    }

    /// Leading lines of tool output that are column headers, not packages.
    fn header_lines(self) -> usize {
        match self {
            Ecosystem::Pip => 2,
            Ecosystem::Choco => 0,
        }
    }

    fn fields(self, line: &str) -> Vec<&str> {
        match self {
            Ecosystem::Pip => line.split_whitespace().collect(),
            Ecosystem::Choco => line.split('|').map(str::trim).collect(),
        }
    }
}

/// One row of "outdated packages" output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outdated {
    pub name: String,
    pub current: String,
    pub latest: String,
}

/// Every row must carry exactly `name current latest extra`.
const FIELD_COUNT: usize = 4;

/// Parses the package rows of `ecosystem`'s output, skipping its header and
/// blank lines. Each item is an error if its row has the wrong field count.
pub fn parse_outdated(
    ecosystem: Ecosystem,
    output: &str,
) -> impl Iterator<Item = Result<Outdated>> + '_ {
    output
        .lines()
        .skip(ecosystem.header_lines())
        .filter(|line| !line.trim().is_empty())
        .map(move |line| {
            let fields = ecosystem.fields(line);
            if fields.len() != FIELD_COUNT {
                bail!(
                    "malformed {} line (expected {FIELD_COUNT} fields, got {}): {line:?}",
                    ecosystem.name(),
                    fields.len()
                );
            }
            Ok(Outdated {
                name: fields[0].to_string(),
                current: fields[1].to_string(),
                latest: fields[2].to_string(),
            })
        })
}

/// Decides whether an outdated package counts as an available upgrade.
#[derive(Debug, Clone, Default)]
pub struct UpgradePolicy {
    ignore: HashSet<String>,
    ignore_breaking_changes: bool,
}

impl UpgradePolicy {
    pub fn new(ignore: impl IntoIterator<Item = String>, ignore_breaking_changes: bool) -> Self {
        Self {
            ignore: ignore.into_iter().collect(),
            ignore_breaking_changes,
        }
    }

    /// Ignored names never count. With the breaking-change filter on, a row
    /// needs at least one strict `MAJOR.MINOR.PATCH` version, and the leading
    /// major of `latest` must not exceed that of `current`.
    pub fn counts(&self, pkg: &Outdated) -> bool {
        if self.ignore.contains(&pkg.name) {
            return false;
        }
        if self.ignore_breaking_changes {
            if major_of(&pkg.current).is_none() && major_of(&pkg.latest).is_none() {
                return false;
            }
            let (Some(current), Some(latest)) =
                (leading_major(&pkg.current), leading_major(&pkg.latest))
            else {
                return false;
            };
            if latest > current {
                return false;
            }
        }
        true
    }
}

fn semver_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)\.\d+\.\d+$").expect("static pattern"))
}

fn leading_number() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)").expect("static pattern"))
}

/// Major component of a strict numeric `MAJOR.MINOR.PATCH` version.
pub fn major_of(version: &str) -> Option<u64> {
    semver_pattern()
        .captures(version)
        .and_then(|c| c[1].parse().ok())
}

/// Leading run of digits, e.g. `1` for `1.2.4.post1`.
pub fn leading_major(version: &str) -> Option<u64> {
    leading_number()
        .captures(version)
        .and_then(|c| c[1].parse().ok())
}

/// Scans `output` and returns `true` at the first package the policy counts.
/// Rows after the first counted package are not examined.
pub fn evaluate(ecosystem: Ecosystem, output: &str, policy: &UpgradePolicy) -> Result<bool> {
    for pkg in parse_outdated(ecosystem, output) {
        let pkg = pkg?;
        if policy.counts(&pkg) {
            debug!(
                "{}: {} {} -> {} is an upgrade",
                ecosystem.name(),
                pkg.name,
                pkg.current,
                pkg.latest
            );
            return Ok(true);
        }
    }
    Ok(false)
}

/// "Upgrade available" flags, one per ecosystem.
///
/// Workers only [`raise`](Self::raise); the event loop only
/// [`take`](Self::take)s. A raised flag stays up until taken.
#[derive(Debug, Default)]
pub struct UpdateFlags {
    pip: AtomicBool,
    choco: AtomicBool,
}

impl UpdateFlags {
    fn slot(&self, ecosystem: Ecosystem) -> &AtomicBool {
        match ecosystem {
            Ecosystem::Pip => &self.pip,
            Ecosystem::Choco => &self.choco,
        }
    }

    pub fn raise(&self, ecosystem: Ecosystem) {
        self.slot(ecosystem).store(true, Ordering::Release);
    }

    /// Returns whether the flag was up and lowers it in the same step.
    pub fn take(&self, ecosystem: Ecosystem) -> bool {
        self.slot(ecosystem).swap(false, Ordering::AcqRel)
    }
}

/// Produces the raw "outdated packages" listing for an ecosystem.
pub trait OutdatedSource: Send + Sync + 'static {
    /// `Ok(None)` means the tool is unavailable, which is not an error.
    fn list_outdated(
        &self,
        ecosystem: Ecosystem,
        command: &[String],
    ) -> impl Future<Output = Result<Option<String>>> + Send;
}

/// Runs the configured package-manager commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalTools;

impl OutdatedSource for ExternalTools {
    async fn list_outdated(&self, ecosystem: Ecosystem, command: &[String]) -> Result<Option<String>> {
        match external::capture(command).await {
            Ok(out) if out.success => Ok(Some(out.stdout)),
            Ok(_) => {
                debug!("{}: tool exited unsuccessfully", ecosystem.name());
                Ok(None)
            }
            Err(e) => {
                debug!("{}: tool unavailable: {e:#}", ecosystem.name());
                Ok(None)
            }
        }
    }
}

/// Settings for one ecosystem's worker.
#[derive(Debug, Clone)]
pub struct EcosystemCheck {
    pub ecosystem: Ecosystem,
    pub enabled: bool,
    pub command: Vec<String>,
    pub policy: UpgradePolicy,
}

impl EcosystemCheck {
    pub fn from_config(ecosystem: Ecosystem, config: &EcosystemConfig) -> Self {
        Self {
            ecosystem,
            enabled: config.enabled,
            command: config
                .command
                .clone()
                .unwrap_or_else(|| ecosystem.default_command()),
            policy: UpgradePolicy::new(config.ignore.iter().cloned(), config.ignore_breaking_changes),
        }
    }

    /// Runs the check to completion. Every failure collapses to `false`.
    async fn run<S: OutdatedSource>(&self, source: &S) -> bool {
        let name = self.ecosystem.name();
        if !self.enabled {
            return false;
        }
        let output = match source.list_outdated(self.ecosystem, &self.command).await {
            Ok(Some(output)) => output,
            Ok(None) => return false,
            Err(e) => {
                warn!("{name}: listing outdated packages failed: {e:#}");
                return false;
            }
        };
        match evaluate(self.ecosystem, &output, &self.policy) {
            Ok(found) => found,
            Err(e) => {
                warn!("{name}: update check aborted: {e:#}");
                false
            }
        }
    }
}

/// Outcome of one completed check cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub pip: bool,
    pub choco: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateChecker {
    pip: EcosystemCheck,
    choco: EcosystemCheck,
}

impl UpdateChecker {
    pub fn from_config(config: &UpdatesConfig) -> Self {
        Self {
            pip: EcosystemCheck::from_config(Ecosystem::Pip, &config.pip),
            choco: EcosystemCheck::from_config(Ecosystem::Choco, &config.choco),
        }
    }

    /// Starts one worker per ecosystem and returns immediately. Each worker
    /// raises its flag in `flags` when it finds an upgrade.
    pub fn spawn<S: OutdatedSource>(
        &self,
        source: Arc<S>,
        flags: Arc<UpdateFlags>,
    ) -> [(Ecosystem, JoinHandle<bool>); 2] {
        [self.pip.clone(), self.choco.clone()].map(|check| {
            let source = Arc::clone(&source);
            let flags = Arc::clone(&flags);
            let ecosystem = check.ecosystem;
            let handle = tokio::spawn(async move {
                let found = check.run(source.as_ref()).await;
                if found {
                    info!("{}: upgrades available", ecosystem.name());
                    flags.raise(ecosystem);
                }
                found
            });
            (ecosystem, handle)
        })
    }

    /// Runs both ecosystem checks concurrently and waits for both.
    pub async fn check_all<S: OutdatedSource>(
        &self,
        source: Arc<S>,
        flags: Arc<UpdateFlags>,
    ) -> UpdateReport {
        let mut report = UpdateReport::default();
        for (ecosystem, handle) in self.spawn(source, flags) {
            let found = handle.await.unwrap_or(false);
            match ecosystem {
                Ecosystem::Pip => report.pip = found,
                Ecosystem::Choco => report.choco = found,
            }
        }
        report
    }
}
