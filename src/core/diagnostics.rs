use std::fmt;

use serde::Serialize;

use crate::core::features::{CapabilityGroup, FeatureFlags};
use crate::core::hardware::Detection;
use crate::core::tiers::{SupportedTiers, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "flags", rename_all = "snake_case")]
pub enum GroupStatus {
    Satisfied,
    /// The processor does not report these flags.
    Missing(FeatureFlags),
    /// The processor has the whole group but the OS does not save its
    /// register state.
    OsDisabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub group: CapabilityGroup,
    pub tier: Tier,
    pub required: FeatureFlags,
    pub status: GroupStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub tiers: SupportedTiers,
    pub tiers_bits: u32,
    pub selected: Tier,
    pub max_leaf: u32,
    pub cpu_flags: FeatureFlags,
    pub usable_flags: FeatureFlags,
    pub osxsave: bool,
    pub xcr0: Option<u32>,
    pub require_bmi: bool,
    pub groups: Vec<GroupReport>,
}

pub struct Diagnostics;

impl Diagnostics {
    /// Explains, group by group, why each tier is or is not available.
    pub fn report(detection: &Detection) -> Report {
        let groups = CapabilityGroup::ALL
            .into_iter()
            .map(|group| {
                let required = group.flags(detection.options);
                GroupReport {
                    group,
                    tier: group.tier(),
                    required,
                    status: Self::group_status(detection, required),
                }
            })
            .collect();

        Report {
            tiers: detection.tiers,
            tiers_bits: detection.tiers.bits(),
            selected: detection.tiers.best(),
            max_leaf: detection.max_leaf,
            cpu_flags: detection.cpu_flags,
            usable_flags: detection.usable_flags,
            osxsave: detection.osxsave,
            xcr0: detection.xcr0,
            require_bmi: detection.options.require_bmi,
            groups,
        }
    }

    fn group_status(detection: &Detection, required: FeatureFlags) -> GroupStatus {
        if detection.usable_flags.contains(required) {
            GroupStatus::Satisfied
        } else if detection.cpu_flags.contains(required) {
            GroupStatus::OsDisabled
        } else {
            GroupStatus::Missing(required - detection.cpu_flags)
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Supported tiers: {} (mask {})", self.tiers, self.tiers_bits)?;
        writeln!(f, "Selected kernel: {}", self.selected)?;
        writeln!(f, "Max CPUID leaf:  {:#x}", self.max_leaf)?;
        match self.xcr0 {
            Some(xcr0) => writeln!(f, "XCR0:            {:#x}", xcr0)?,
            None => writeln!(f, "XCR0:            not read (OSXSAVE clear)")?,
        }
        if !self.require_bmi {
            writeln!(f, "BMI/BMI2 not required for avx2")?;
        }
        for g in &self.groups {
            let status = match g.status {
                GroupStatus::Satisfied => "ok".to_string(),
                GroupStatus::OsDisabled => "disabled by OS (register state not saved)".to_string(),
                GroupStatus::Missing(flags) => format!("missing {}", flag_names(flags)),
            };
            writeln!(f, "  {:<7} {}", g.tier.as_str(), status)?;
        }
        Ok(())
    }
}

fn flag_names(flags: FeatureFlags) -> String {
    flags
        .iter_names()
        .map(|(name, _)| name)
        .collect::<Vec<_>>()
        .join(" ")
}
