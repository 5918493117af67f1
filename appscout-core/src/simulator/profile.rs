use serde::Serialize;
use tracing::warn;

/// Known simulator models as `(name, width, height, tab_bar_y)` in logical points.
pub const DEVICE_PROFILES: &[(&str, u32, u32, u32)] = &[
    ("iPhone SE (3rd generation)", 375, 667, 642),
    ("iPhone 13 mini", 375, 812, 783),
    ("iPhone 14", 390, 844, 810),
    ("iPhone 14 Plus", 428, 926, 892),
    ("iPhone 15", 393, 852, 818),
    ("iPhone 15 Plus", 430, 932, 898),
    ("iPhone 15 Pro", 393, 852, 818),
    ("iPhone 15 Pro Max", 430, 932, 898),
    ("iPhone 16", 393, 852, 818),
    ("iPhone 16 Pro", 402, 874, 840),
    ("iPhone 16 Pro Max", 440, 956, 922),
    ("iPad (10th generation)", 820, 1180, 1150),
    ("iPad Pro (12.9-inch) (6th generation)", 1024, 1366, 1336),
];

const FALLBACK_PROFILE: &str = "iPhone 15 Pro";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceProfile {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub tab_bar_y: u32,
}

impl DeviceProfile {
    pub fn new(name: impl Into<String>, width: u32, height: u32, tab_bar_y: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            tab_bar_y,
        }
    }

    /// Resolves a device identifier to a profile. Exact names win; otherwise the
    /// longest known name contained in the identifier is used, so runtime
    /// suffixes such as `iPhone 15 Pro (17.2)` still resolve.
    pub fn resolve(identifier: &str) -> DeviceProfile {
        let needle = identifier.trim().to_lowercase();
        let exact = DEVICE_PROFILES
            .iter()
            .find(|(name, ..)| name.to_lowercase() == needle);
        let contained = || {
            DEVICE_PROFILES
                .iter()
                .filter(|(name, ..)| needle.contains(&name.to_lowercase()))
                .max_by_key(|(name, ..)| name.len())
        };
        match exact.or_else(contained) {
            Some(entry) => Self::from_entry(entry),
            None => {
                warn!(
                    device = %identifier,
                    fallback = FALLBACK_PROFILE,
                    "unknown device identifier, using fallback profile"
                );
                Self::fallback()
            }
        }
    }

    pub fn fallback() -> DeviceProfile {
        DEVICE_PROFILES
            .iter()
            .find(|(name, ..)| *name == FALLBACK_PROFILE)
            .map(Self::from_entry)
            .unwrap_or_else(|| DeviceProfile::new(FALLBACK_PROFILE, 393, 852, 818))
    }

    pub fn all() -> Vec<DeviceProfile> {
        DEVICE_PROFILES.iter().map(Self::from_entry).collect()
    }

    fn from_entry(entry: &(&str, u32, u32, u32)) -> DeviceProfile {
        let (name, width, height, tab_bar_y) = *entry;
        DeviceProfile::new(name, width, height, tab_bar_y)
    }

    /// Converts screen fractions to absolute points.
    pub fn point(&self, fx: f64, fy: f64) -> (f64, f64) {
        (
            (self.width as f64 * fx).round(),
            (self.height as f64 * fy).round(),
        )
    }

    /// Evenly spaced tap targets across the tab bar for a given tab count.
    pub fn tab_points(&self, count: usize) -> Vec<(f64, f64)> {
        let width = self.width as f64;
        (0..count)
            .map(|index| {
                let x = width * (2 * index + 1) as f64 / (2 * count) as f64;
                (x.round(), self.tab_bar_y as f64)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_exact_and_suffixed_names() {
        let exact = DeviceProfile::resolve("iphone 15 pro max");
        assert_eq!(exact.width, 430);
        let suffixed = DeviceProfile::resolve("iPhone 15 Pro Max (17.2)");
        assert_eq!(suffixed.name, "iPhone 15 Pro Max");
    }

    #[test]
    fn unknown_device_uses_fallback() {
        let profile = DeviceProfile::resolve("Pixel 8");
        assert_eq!(profile.name, FALLBACK_PROFILE);
        assert_eq!(profile.tab_bar_y, 818);
    }

    #[test]
    fn tab_points_are_evenly_spaced() {
        let profile = DeviceProfile::new("test", 400, 800, 760);
        let points = profile.tab_points(4);
        assert_eq!(
            points,
            vec![(50.0, 760.0), (150.0, 760.0), (250.0, 760.0), (350.0, 760.0)]
        );
    }
}
