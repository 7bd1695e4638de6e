use serde::{Deserialize, Serialize};

const MOBILE_MARKERS: [&str; 4] = ["iphone", "ipad", "ipod", "android"];

/// Capabilities of the host device, read once at startup.
///
/// Every performance tiering decision in the crate goes through this value
/// instead of querying the platform again.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub is_mobile: bool,
    pub hardware_concurrency: u32,
    pub device_pixel_ratio: f64,
}

impl DeviceProfile {
    pub const MOBILE_SUBDIVISIONS: u32 = 40;
    pub const LOW_END_SUBDIVISIONS: u32 = 50;
    pub const DESKTOP_SUBDIVISIONS: u32 = 65;

    pub fn new(is_mobile: bool, hardware_concurrency: u32, device_pixel_ratio: f64) -> Self {
        Self {
            is_mobile,
            hardware_concurrency,
            device_pixel_ratio,
        }
    }

    /// Classifies a browser from its user agent string and reported core count.
    pub fn from_user_agent(user_agent: &str, hardware_concurrency: u32, device_pixel_ratio: f64) -> Self {
        let agent = user_agent.to_ascii_lowercase();
        let is_mobile = MOBILE_MARKERS.iter().any(|marker| agent.contains(marker));
        Self::new(is_mobile, hardware_concurrency, device_pixel_ratio)
    }

    /// Profile of the machine running the native binary.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn native(device_pixel_ratio: f64) -> Self {
        let cores = std::thread::available_parallelism()
            .map(|count| count.get() as u32)
            .unwrap_or(1);
        Self::new(false, cores, device_pixel_ratio)
    }

    pub fn is_low_end(&self) -> bool {
        self.is_mobile || self.hardware_concurrency <= 4
    }

    /// Icosahedron detail level, bounding vertex shader cost on weak devices.
    pub fn subdivision_level(&self) -> u32 {
        if self.is_mobile {
            Self::MOBILE_SUBDIVISIONS
        } else if self.is_low_end() {
            Self::LOW_END_SUBDIVISIONS
        } else {
            Self::DESKTOP_SUBDIVISIONS
        }
    }

    /// Pixel ratio cap applied when the viewport is first built.
    pub fn pixel_ratio_cap(&self) -> f64 {
        if self.is_mobile {
            1.0
        } else {
            2.0
        }
    }

    pub fn panel_visible(&self) -> bool {
        !self.is_mobile
    }

    pub fn tier_name(&self) -> &'static str {
        if self.is_mobile {
            "mobile"
        } else if self.is_low_end() {
            "low-end desktop"
        } else {
            "desktop"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15";
    const ANDROID: &str = "Mozilla/5.0 (Linux; android 14; Pixel 8) AppleWebKit/537.36";
    const DESKTOP: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/126.0";

    #[test]
    fn user_agent_detection_is_case_insensitive() {
        assert!(DeviceProfile::from_user_agent(IPHONE, 6, 3.0).is_mobile);
        assert!(DeviceProfile::from_user_agent(ANDROID, 8, 2.0).is_mobile);
        assert!(!DeviceProfile::from_user_agent(DESKTOP, 8, 1.0).is_mobile);
    }

    #[test]
    fn mobile_devices_get_forty_subdivisions() {
        let profile = DeviceProfile::new(true, 16, 3.0);
        assert_eq!(profile.subdivision_level(), 40);
    }

    #[test]
    fn few_cores_get_fifty_subdivisions() {
        assert_eq!(DeviceProfile::new(false, 4, 1.0).subdivision_level(), 50);
        assert_eq!(DeviceProfile::new(false, 2, 1.0).subdivision_level(), 50);
        assert_eq!(DeviceProfile::new(false, 0, 1.0).subdivision_level(), 50);
    }

    #[test]
    fn capable_desktops_get_sixty_five_subdivisions() {
        assert_eq!(DeviceProfile::new(false, 5, 1.0).subdivision_level(), 65);
        assert_eq!(DeviceProfile::new(false, 32, 1.0).subdivision_level(), 65);
    }

    #[test]
    fn panel_and_pixel_ratio_follow_the_tier() {
        let mobile = DeviceProfile::new(true, 8, 3.0);
        assert!(!mobile.panel_visible());
        assert_eq!(mobile.pixel_ratio_cap(), 1.0);

        let desktop = DeviceProfile::new(false, 8, 3.0);
        assert!(desktop.panel_visible());
        assert_eq!(desktop.pixel_ratio_cap(), 2.0);
    }
}
