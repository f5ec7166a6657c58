//! Semantic version type for application and engine identification.

use std::fmt;

/// A semantic version triple.
///
/// Used for the application and engine versions reported to the graphics
/// API at instance creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// Create a new version.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Pack into the Vulkan `VK_MAKE_API_VERSION` layout (variant 0).
    pub const fn to_vk(self) -> u32 {
        (self.major << 22) | (self.minor << 12) | self.patch
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new(0, 1, 0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vk_packing() {
        let v = Version::new(1, 2, 3);
        assert_eq!(v.to_vk(), (1 << 22) | (2 << 12) | 3);
    }

    #[test]
    fn display() {
        assert_eq!(Version::new(2, 0, 11).to_string(), "2.0.11");
    }
}
