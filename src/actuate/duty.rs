use std::collections::BTreeMap;

use anyhow::{bail, Result};

use crate::classify::ClassLabel;

/// Largest duty magnitude for one wheel.
pub const MAX_DUTY: i32 = 4095;

/// Magnitude used for labels missing from a [`SpeedTable`].
pub const DEFAULT_MAGNITUDE: i32 = 1300;

/// Signed duties for the four wheels, in order: left-upper, left-lower,
/// right-upper, right-lower. Every value lies in `[-MAX_DUTY, MAX_DUTY]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DutyProfile([i32; 4]);

impl DutyProfile {
    pub const STOP: DutyProfile = DutyProfile([0; 4]);

    /// Build a profile, clamping each duty independently.
    pub fn new(duties: [i32; 4]) -> Self {
        Self(duties.map(|d| d.clamp(-MAX_DUTY, MAX_DUTY)))
    }

    pub fn uniform(duty: i32) -> Self {
        Self::new([duty; 4])
    }

    pub fn duties(&self) -> [i32; 4] {
        self.0
    }

    pub fn is_stop(&self) -> bool {
        self.0 == [0; 4]
    }
}

impl From<[i32; 4]> for DutyProfile {
    fn from(duties: [i32; 4]) -> Self {
        Self::new(duties)
    }
}

/// Label to speed magnitude. Total: unknown labels get the default magnitude.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpeedTable {
    entries: BTreeMap<ClassLabel, i32>,
    default: i32,
}

impl Default for SpeedTable {
    fn default() -> Self {
        Self {
            entries: [("50", 1300), ("70", 1900), ("90", 2250)]
                .into_iter()
                .map(|(label, magnitude)| (ClassLabel::from(label), magnitude))
                .collect(),
            default: DEFAULT_MAGNITUDE,
        }
    }
}

impl SpeedTable {
    pub fn new(
        entries: impl IntoIterator<Item = (ClassLabel, i32)>,
        default: i32,
    ) -> Result<Self> {
        let entries: BTreeMap<ClassLabel, i32> = entries.into_iter().collect();
        check_magnitude("default", default)?;
        for (label, &magnitude) in &entries {
            check_magnitude(label.as_str(), magnitude)?;
        }
        Ok(Self { entries, default })
    }

    pub fn default_magnitude(&self) -> i32 {
        self.default
    }

    pub fn entries(&self) -> impl Iterator<Item = (&ClassLabel, i32)> {
        self.entries.iter().map(|(label, &m)| (label, m))
    }

    pub fn magnitude(&self, label: &ClassLabel) -> i32 {
        match self.entries.get(label) {
            Some(&magnitude) => magnitude,
            None => {
                log::debug!("no speed entry for '{}', using {}", label, self.default);
                self.default
            }
        }
    }

    /// Same signed magnitude on all four wheels; negated when `reversed`.
    pub fn map_to_duties(&self, label: &ClassLabel, reversed: bool) -> DutyProfile {
        let magnitude = self.magnitude(label);
        DutyProfile::uniform(if reversed { -magnitude } else { magnitude })
    }
}

fn check_magnitude(label: &str, magnitude: i32) -> Result<()> {
    if !(0..=MAX_DUTY).contains(&magnitude) {
        bail!(
            "speed for '{}' must be within 0..={}, got {}",
            label,
            MAX_DUTY,
            magnitude
        );
    }
    Ok(())
}
