use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

bitflags! {
    /// Rendering API variants a context may expose.
    ///
    /// A display filters the set it will hand out and an element declares the
    /// set it can render with; the two only have to intersect.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GlApi: u32 {
        /// Legacy desktop OpenGL (fixed function, compatibility profile).
        const OPENGL = 1 << 0;
        /// Desktop OpenGL 3.x core profile.
        const OPENGL3 = 1 << 1;
        /// OpenGL ES 1.x.
        const GLES1 = 1 << 15;
        /// OpenGL ES 2.x and 3.x.
        const GLES2 = 1 << 16;
        const ANY = u32::MAX;
    }
}

const NAMED: [(GlApi, &str); 4] = [
    (GlApi::OPENGL, "opengl"),
    (GlApi::OPENGL3, "opengl3"),
    (GlApi::GLES1, "gles1"),
    (GlApi::GLES2, "gles2"),
];

impl GlApi {
    pub fn is_gles(self) -> bool {
        self.intersects(GlApi::GLES1 | GlApi::GLES2)
    }

    pub fn is_desktop(self) -> bool {
        self.intersects(GlApi::OPENGL | GlApi::OPENGL3)
    }
}

impl fmt::Display for GlApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == GlApi::ANY {
            return f.write_str("any");
        }
        let names: Vec<&str> = NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join(" "))
        }
    }
}

impl FromStr for GlApi {
    type Err = String;

    /// Parses a space or comma separated list such as `opengl3,gles2`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut api = GlApi::empty();
        for token in input
            .split(|ch: char| ch == ',' || ch.is_whitespace())
            .filter(|token| !token.is_empty())
        {
            let token = token.to_ascii_lowercase();
            match token.as_str() {
                "any" => api |= GlApi::ANY,
                "none" => {}
                other => {
                    let flag = NAMED
                        .iter()
                        .find(|(_, name)| *name == other)
                        .map(|(flag, _)| *flag)
                        .ok_or_else(|| format!("unknown GL API '{other}'"))?;
                    api |= flag;
                }
            }
        }
        Ok(api)
    }
}

/// GL version reported by a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlVersion {
    pub major: u32,
    pub minor: u32,
}

impl GlVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for GlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlslProfile {
    Es,
    Core,
    Compatibility,
    /// Pre-1.50 desktop GLSL has no profile qualifier.
    None,
}

/// Shading-language version derived from a context's API and GL version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlslVersion {
    pub version: u32,
    pub profile: GlslProfile,
}

impl GlslVersion {
    /// Maps a GL version onto the GLSL version it ships with.
    ///
    /// Returns `None` when the combination has no shading language (GLES 1,
    /// desktop GL below 2.0).
    pub fn for_context(api: GlApi, version: GlVersion) -> Option<Self> {
        if api.contains(GlApi::GLES2) {
            let glsl = match (version.major, version.minor) {
                (2, 0) => 100,
                (3, minor) if minor <= 2 => 300 + minor * 10,
                _ => return None,
            };
            return Some(Self {
                version: glsl,
                profile: GlslProfile::Es,
            });
        }

        if !api.is_desktop() {
            return None;
        }

        let glsl = match (version.major, version.minor) {
            (2, 0) => 110,
            (2, 1) => 120,
            (3, 0) => 130,
            (3, 1) => 140,
            (3, 2) => 150,
            (major, minor) if major >= 3 => major * 100 + minor * 10,
            _ => return None,
        };
        let profile = if glsl < 150 {
            GlslProfile::None
        } else if api.contains(GlApi::OPENGL3) && !api.contains(GlApi::OPENGL) {
            GlslProfile::Core
        } else {
            GlslProfile::Compatibility
        };
        Some(Self {
            version: glsl,
            profile,
        })
    }

    /// Whether shaders may use the `precision` qualifier.
    pub fn supports_precision(&self) -> bool {
        match self.profile {
            GlslProfile::Es => true,
            _ => self.version >= 130,
        }
    }

    /// Whether `precision highp` is guaranteed in fragment shaders.
    pub fn supports_precision_highp(&self) -> bool {
        match self.profile {
            GlslProfile::Es => self.version >= 300,
            _ => self.version >= 130,
        }
    }
}

impl fmt::Display for GlslVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.profile {
            GlslProfile::Es if self.version >= 300 => write!(f, "{} es", self.version),
            GlslProfile::Core => write!(f, "{} core", self.version),
            GlslProfile::Compatibility => write!(f, "{} compatibility", self.version),
            _ => write!(f, "{}", self.version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_api_sets() {
        assert_eq!(GlApi::ANY.to_string(), "any");
        assert_eq!(GlApi::empty().to_string(), "none");
        assert_eq!((GlApi::OPENGL3 | GlApi::GLES2).to_string(), "opengl3 gles2");
    }

    #[test]
    fn parses_api_lists() {
        assert_eq!(
            "opengl3, gles2".parse::<GlApi>().unwrap(),
            GlApi::OPENGL3 | GlApi::GLES2
        );
        assert_eq!("any".parse::<GlApi>().unwrap(), GlApi::ANY);
        assert!("vulkan".parse::<GlApi>().is_err());
    }

    #[test]
    fn derives_glsl_versions() {
        let es = GlslVersion::for_context(GlApi::GLES2, GlVersion::new(3, 1)).unwrap();
        assert_eq!(es.version, 310);
        assert_eq!(es.profile, GlslProfile::Es);

        let core = GlslVersion::for_context(GlApi::OPENGL3, GlVersion::new(4, 5)).unwrap();
        assert_eq!(core.version, 450);
        assert_eq!(core.profile, GlslProfile::Core);

        let legacy = GlslVersion::for_context(GlApi::OPENGL, GlVersion::new(2, 1)).unwrap();
        assert_eq!(legacy.version, 120);
        assert!(!legacy.supports_precision());

        assert!(GlslVersion::for_context(GlApi::GLES1, GlVersion::new(1, 1)).is_none());
    }

    #[test]
    fn gles2_lacks_guaranteed_highp() {
        let es2 = GlslVersion::for_context(GlApi::GLES2, GlVersion::new(2, 0)).unwrap();
        assert!(es2.supports_precision());
        assert!(!es2.supports_precision_highp());
    }
}
