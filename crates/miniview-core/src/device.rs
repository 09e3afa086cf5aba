#![forbid(unsafe_code)]

//! Device and platform classification.
//!
//! Classification decides whether a launch is treated as mobile, tablet or
//! desktop, and which platform the embedding client runs on. It is a pure
//! function of three signals:
//!
//! - viewport width in logical pixels (`0` when unknown),
//! - the rendering engine's user-agent string,
//! - the platform string reported by the host SDK, if any.
//!
//! # Decision Rules
//!
//! ```text
//! tablet_ua  = UA matches a tablet pattern
//! mobile_ua  = UA contains a mobile keyword AND NOT tablet_ua
//! narrow     = 0 < width <= breakpoint
//!
//! IF mobile_ua OR narrow        THEN mobile
//! ELSE IF tablet_ua             THEN tablet
//! ELSE IF any signal present    THEN desktop
//! ELSE                               unknown
//!
//! IF host platform is ios/android THEN mobile
//! IF host platform is web         THEN desktop
//! ```
//!
//! # Precedence
//!
//! The host platform is authoritative: it is the embedding client's own
//! report, while the user agent is only the webview's view of itself and
//! can disagree (a desktop client embedding a mobile-styled webview).
//!
//! # Failure Modes
//!
//! | Mode | Condition | Result |
//! |------|-----------|--------|
//! | No signals | empty UA, width 0, no host platform | `unknown` device, `unknown` platform |
//! | Client-only platform | host reports `tdesktop` | platform inferred from UA |
//! | Unrecognised platform | host reports a new string | platform inferred from UA |

use std::fmt;

/// Viewport widths at or below this are treated as mobile.
pub const DEFAULT_MOBILE_BREAKPOINT_PX: u32 = 768;

/// User-agent keywords that indicate a phone-class device.
const MOBILE_KEYWORDS: &[&str] = &[
    "android",
    "iphone",
    "ipod",
    "blackberry",
    "iemobile",
    "opera mini",
    "webos",
    "mobile",
];

/// User-agent keywords that indicate a tablet.
const TABLET_KEYWORDS: &[&str] = &["ipad", "tablet", "kindle", "silk", "playbook"];

/// Coarse device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
    Unknown,
}

impl DeviceClass {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::Desktop => "desktop",
            Self::Unknown => "unknown",
        }
    }

    /// Whether this class is offered fullscreen at launch.
    #[must_use]
    pub const fn is_desktop(&self) -> bool {
        matches!(self, Self::Desktop)
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operating platform of the embedding client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Platform {
    Ios,
    Android,
    Macos,
    Windows,
    Linux,
    Web,
    Unknown,
}

impl Platform {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Macos => "macos",
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Web => "web",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a host-reported platform string.
    ///
    /// Returns `None` when the string names a client rather than an OS
    /// (`tdesktop`) or is not recognised, so that local inference applies.
    #[must_use]
    pub fn from_host(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ios" => Some(Self::Ios),
            "android" | "android_x" => Some(Self::Android),
            "macos" => Some(Self::Macos),
            "web" | "weba" | "webk" => Some(Self::Web),
            "unigram" => Some(Self::Windows),
            _ => None,
        }
    }

    /// Infer the platform from a lowercased user-agent string.
    fn from_user_agent(ua: &str) -> Option<Self> {
        if ["iphone", "ipad", "ipod"].iter().any(|k| ua.contains(k)) {
            Some(Self::Ios)
        } else if ua.contains("android") {
            Some(Self::Android)
        } else if ua.contains("macintosh") || ua.contains("mac os x") {
            Some(Self::Macos)
        } else if ua.contains("windows") {
            Some(Self::Windows)
        } else if ua.contains("linux") || ua.contains("x11") {
            Some(Self::Linux)
        } else {
            None
        }
    }

    /// Device class forced by a host-reported platform, if any.
    const fn forced_device(&self) -> Option<DeviceClass> {
        match self {
            Self::Ios | Self::Android => Some(DeviceClass::Mobile),
            Self::Web => Some(DeviceClass::Desktop),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the platform verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PlatformSource {
    Host,
    UserAgent,
    None,
}

/// Environment signals available at launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Signals {
    /// Viewport width in logical pixels; `0` means unknown.
    pub viewport_width: u32,
    /// Rendering engine user agent; empty means unknown.
    pub user_agent: String,
    /// Platform string reported by the host SDK.
    pub host_platform: Option<String>,
}

impl Signals {
    #[must_use]
    pub fn new(viewport_width: u32, user_agent: impl Into<String>) -> Self {
        Self {
            viewport_width,
            user_agent: user_agent.into(),
            host_platform: None,
        }
    }

    #[must_use]
    pub fn with_host_platform(mut self, platform: impl Into<String>) -> Self {
        self.host_platform = Some(platform.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.viewport_width == 0
            && self.user_agent.trim().is_empty()
            && self
                .host_platform
                .as_deref()
                .is_none_or(|p| p.trim().is_empty())
    }
}

/// Classifier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Classification {
    pub device: DeviceClass,
    pub platform: Platform,
    pub platform_source: PlatformSource,
}

impl Classification {
    /// Verdict used when nothing is known.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            device: DeviceClass::Unknown,
            platform: Platform::Unknown,
            platform_source: PlatformSource::None,
        }
    }
}

/// Classify with the default mobile breakpoint.
#[must_use]
pub fn classify(signals: &Signals) -> Classification {
    classify_with_breakpoint(signals, DEFAULT_MOBILE_BREAKPOINT_PX)
}

/// Classify using an explicit mobile breakpoint.
#[must_use]
pub fn classify_with_breakpoint(signals: &Signals, breakpoint_px: u32) -> Classification {
    if signals.is_empty() {
        return Classification::unknown();
    }

    let ua = signals.user_agent.to_ascii_lowercase();
    let tablet_ua = is_tablet_ua(&ua);
    let mobile_ua = !tablet_ua && MOBILE_KEYWORDS.iter().any(|k| ua.contains(k));
    let narrow = signals.viewport_width > 0 && signals.viewport_width <= breakpoint_px;

    let local_device = if mobile_ua || narrow {
        DeviceClass::Mobile
    } else if tablet_ua {
        DeviceClass::Tablet
    } else {
        DeviceClass::Desktop
    };

    let host_platform = signals.host_platform.as_deref().and_then(Platform::from_host);

    let (platform, platform_source) = match host_platform {
        Some(p) => (p, PlatformSource::Host),
        None => match Platform::from_user_agent(&ua) {
            Some(p) => (p, PlatformSource::UserAgent),
            None => (Platform::Unknown, PlatformSource::None),
        },
    };

    let device = host_platform
        .and_then(|p| p.forced_device())
        .unwrap_or(local_device);

    Classification {
        device,
        platform,
        platform_source,
    }
}

/// Tablet UAs: explicit tablet keywords, or Android without the phone marker.
fn is_tablet_ua(ua: &str) -> bool {
    TABLET_KEYWORDS.iter().any(|k| ua.contains(k))
        || (ua.contains("android") && !ua.contains("mobile"))
}
