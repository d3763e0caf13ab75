/// OS power profiles, read from and applied through an external tool
/// (`powercfg` by default).
use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::config::PowerConfig;
use crate::external;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerProfile {
    pub id: String,
    pub display_name: String,
    pub is_active: bool,
}

fn profile_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})\s+\((.+)\)\s*(\*)?\s*$",
        )
        .expect("static pattern")
    })
}

/// Extracts profiles from the list command's output. Lines without a GUID
/// followed by a parenthesised name are ignored.
pub fn parse_profiles(output: &str) -> Vec<PowerProfile> {
    output
        .lines()
        .filter_map(|line| profile_pattern().captures(line.trim_end()))
        .map(|c| PowerProfile {
            id: c[1].to_lowercase(),
            display_name: c[2].trim().to_string(),
            is_active: c.get(3).is_some(),
        })
        .collect()
}

/// Id of the profile marked active, if any.
pub fn active_id(profiles: &[PowerProfile]) -> Option<String> {
    profiles.iter().find(|p| p.is_active).map(|p| p.id.clone())
}

/// Runs the list command. The exit code is ignored and any failure yields an
/// empty list.
pub async fn list_profiles(config: &PowerConfig) -> Vec<PowerProfile> {
    match external::capture(&config.list_command).await {
        Ok(out) => {
            let profiles = parse_profiles(&out.stdout);
            debug!("found {} power profiles", profiles.len());
            profiles
        }
        Err(e) => {
            debug!("power profiles unavailable: {e:#}");
            Vec::new()
        }
    }
}

/// Asks the tool to activate `id` without waiting for the result.
pub fn set_active(config: &PowerConfig, id: &str) -> Result<()> {
    let mut argv = config.set_command.clone();
    argv.push(id.to_string());
    external::spawn_detached(&argv)?;
    info!("switching power profile to {id}");
    Ok(())
}

/// The daemon's view of which profile is active: the enumerated profiles plus
/// a single cached active id, updated when the user picks a profile.
#[derive(Debug, Clone, Default)]
pub struct PowerProfiles {
    profiles: Vec<PowerProfile>,
    active: Option<String>,
}

impl PowerProfiles {
    pub fn new(profiles: Vec<PowerProfile>) -> Self {
        let active = active_id(&profiles);
        Self { profiles, active }
    }

    pub fn profiles(&self) -> &[PowerProfile] {
        &self.profiles
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Applies `id` through the tool and records it as active. Unknown ids are
    /// rejected without running anything.
    pub fn activate(&mut self, config: &PowerConfig, id: &str) -> bool {
        if !self.profiles.iter().any(|p| p.id == id) {
            warn!("ignoring unknown power profile {id}");
            return false;
        }
        if let Err(e) = set_active(config, id) {
            warn!("failed to switch power profile: {e:#}");
            return false;
        }
        self.record_active(id);
        true
    }

    fn record_active(&mut self, id: &str) {
        for p in &mut self.profiles {
            p.is_active = p.id == id;
        }
        self.active = Some(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POWERCFG_LIST: &str = "\
Existing Power Schemes (* Active)
-----------------------------------
Power Scheme GUID: 381b4222-f694-41f0-9685-ff5bb260df2e  (Balanced) *
Power Scheme GUID: 8c5e7fda-e8bf-4a96-9a85-a6e23a8c635c  (High performance)
Power Scheme GUID: a1841308-3541-4fab-bc81-f71556f20b4a  (Power saver)
";

    #[test]
    fn parses_powercfg_listing() {
        let profiles = parse_profiles(POWERCFG_LIST);
        assert_eq!(profiles.len(), 3);
        assert_eq!(
            profiles[0],
            PowerProfile {
                id: "381b4222-f694-41f0-9685-ff5bb260df2e".to_string(),
                display_name: "Balanced".to_string(),
                is_active: true,
            }
        );
        assert_eq!(profiles[1].display_name, "High performance");
        assert!(!profiles[1].is_active);
        assert!(!profiles[2].is_active);
    }

    #[test]
    fn exactly_one_active_profile_is_reported() {
        let profiles = parse_profiles(POWERCFG_LIST);
        assert_eq!(profiles.iter().filter(|p| p.is_active).count(), 1);
        assert_eq!(
            active_id(&profiles).as_deref(),
            Some("381b4222-f694-41f0-9685-ff5bb260df2e")
        );
    }

    #[test]
    fn display_names_may_contain_parentheses() {
        let line = "Power Scheme GUID: ded574b5-45a0-4f42-8737-46345c09c238  (Ultimate (custom))";
        let profiles = parse_profiles(line);
        assert_eq!(profiles[0].display_name, "Ultimate (custom)");
    }

    #[test]
    fn unparseable_output_yields_empty_list() {
        assert!(parse_profiles("").is_empty());
        assert!(parse_profiles("Access denied.\n").is_empty());
    }

    #[test]
    fn uppercase_guids_are_normalised() {
        let line = "GUID: 381B4222-F694-41F0-9685-FF5BB260DF2E  (Balanced) *";
        assert_eq!(parse_profiles(line)[0].id, "381b4222-f694-41f0-9685-ff5bb260df2e");
    }

    #[test]
    fn record_active_moves_the_marker() {
        let mut state = PowerProfiles::new(parse_profiles(POWERCFG_LIST));
        state.record_active("a1841308-3541-4fab-bc81-f71556f20b4a");
        assert_eq!(state.active(), Some("a1841308-3541-4fab-bc81-f71556f20b4a"));
        assert_eq!(state.profiles().iter().filter(|p| p.is_active).count(), 1);
        assert!(state.profiles()[2].is_active);
    }

    #[tokio::test]
    async fn activate_rejects_unknown_ids() {
        let mut state = PowerProfiles::new(parse_profiles(POWERCFG_LIST));
        assert!(!state.activate(&PowerConfig::default(), "not-a-profile"));
        assert_eq!(state.active(), Some("381b4222-f694-41f0-9685-ff5bb260df2e"));
    }

    #[tokio::test]
    async fn missing_list_tool_yields_empty_list() {
        let config = PowerConfig {
            list_command: vec!["cpuglyph-no-such-powercfg".to_string()],
            ..PowerConfig::default()
        };
        assert!(list_profiles(&config).await.is_empty());
    }
}
