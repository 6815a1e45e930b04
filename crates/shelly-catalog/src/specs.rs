//! Capability vectors derived from `Shelly.GetDeviceInfo`.

use serde::{Deserialize, Serialize};

use crate::CatalogError;

/// What a device model is physically capable of.
///
/// Derived from the `(app, profile)` pair reported by
/// `Shelly.GetDeviceInfo`; populated lazily when a device is first added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpecs {
    pub switches: u8,
    pub covers: u8,
    pub inputs: u8,
    pub lights: u8,
    pub ethernet: bool,
}

impl DeviceSpecs {
    /// Resolve the capability vector for a device `app` identifier.
    ///
    /// Dual-mode devices (e.g. Pro2PM) report `profile` as either
    /// `"switch"` or `"cover"`; the profile decides which of the two
    /// vectors applies.
    pub fn from_app(app: &str, profile: Option<&str>) -> Result<Self, CatalogError> {
        let cover_profile = matches!(profile, Some("cover"));
        let specs = match app {
            "Plus1" | "Plus1Mini" => Self {
                switches: 1,
                inputs: 1,
                ..Self::default()
            },
            "Plus1PM" | "Plus1PMMini" | "Mini1PMG3" | "1PMG3" => Self {
                switches: 1,
                inputs: 1,
                ..Self::default()
            },
            "Plus2PM" | "2PMG3" => {
                if cover_profile {
                    Self {
                        covers: 1,
                        inputs: 2,
                        ..Self::default()
                    }
                } else {
                    Self {
                        switches: 2,
                        inputs: 2,
                        ..Self::default()
                    }
                }
            }
            "PlusPlugS" | "PlusPlugUK" | "PlusPlugIT" | "PlugUS" | "PlugSG3" => Self {
                switches: 1,
                ..Self::default()
            },
            "PlusI4" | "I4G3" => Self {
                inputs: 4,
                ..Self::default()
            },
            "Pro1" | "Pro1PM" => Self {
                switches: 1,
                inputs: 2,
                ethernet: true,
                ..Self::default()
            },
            "Pro2" | "Pro2PM" => {
                if cover_profile {
                    Self {
                        covers: 1,
                        inputs: 2,
                        ethernet: true,
                        ..Self::default()
                    }
                } else {
                    Self {
                        switches: 2,
                        inputs: 2,
                        ethernet: true,
                        ..Self::default()
                    }
                }
            }
            "Pro3" => Self {
                switches: 3,
                inputs: 3,
                ethernet: true,
                ..Self::default()
            },
            "Pro4PM" => Self {
                switches: 4,
                inputs: 4,
                ethernet: true,
                ..Self::default()
            },
            "ProDualCoverPM" => Self {
                covers: 2,
                inputs: 4,
                ethernet: true,
                ..Self::default()
            },
            "PlusWallDimmer" | "DimmerG3" | "0110DimG3" => Self {
                lights: 1,
                inputs: 1,
                ..Self::default()
            },
            "PlusRGBWPM" => Self {
                lights: 4,
                inputs: 4,
                ..Self::default()
            },
            "PlusHT" | "HTG3" | "PlusSmoke" | "BluGw" | "BluGwG3" => Self::default(),
            other => {
                return Err(CatalogError::UnknownApp {
                    app: other.to_string(),
                    profile: profile.map(str::to_string),
                })
            }
        };
        Ok(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pro3_is_three_switches_with_ethernet() {
        let specs = DeviceSpecs::from_app("Pro3", None).unwrap();
        assert_eq!(specs.switches, 3);
        assert_eq!(specs.covers, 0);
        assert!(specs.ethernet);
    }

    #[test]
    fn profile_selects_cover_vector() {
        let switch = DeviceSpecs::from_app("Plus2PM", Some("switch")).unwrap();
        assert_eq!(switch.switches, 2);
        assert_eq!(switch.covers, 0);

        let cover = DeviceSpecs::from_app("Plus2PM", Some("cover")).unwrap();
        assert_eq!(cover.switches, 0);
        assert_eq!(cover.covers, 1);
    }

    #[test]
    fn unknown_app_is_an_error() {
        let err = DeviceSpecs::from_app("Frobnicator9000", None).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownApp { .. }));
    }
}
