//! Outbound user-agent rotation.

const WINDOWS: &str = "Windows NT 10.0; Win64; x64";
const MACOS: &str = "Macintosh; Intel Mac OS X 10_15_7";
const LINUX: &str = "X11; Linux x86_64";

const CHROMIUM_PLATFORMS: &[&str] = &[WINDOWS, MACOS, LINUX];
const FIREFOX_PLATFORMS: &[&str] = &[
    WINDOWS,
    "Macintosh; Intel Mac OS X 10.15",
    LINUX,
    "X11; Ubuntu; Linux x86_64",
];

fn pick<'a>(items: &[&'a str]) -> &'a str {
    items[fastrand::usize(..items.len())]
}

/// Produces a plausible desktop browser user agent per call.
///
/// Stateless: two calls may return the same string.
#[derive(Clone, Copy, Debug, Default)]
pub struct UserAgentRotator;

impl UserAgentRotator {
    pub fn new() -> Self {
        UserAgentRotator
    }

    pub fn next_user_agent(&self) -> String {
        match fastrand::u8(0..4) {
            0 => chrome(),
            1 => edge(),
            2 => firefox(),
            _ => safari(),
        }
    }
}

fn chromium_version() -> (u32, u32, u32) {
    (
        fastrand::u32(120..=131),
        fastrand::u32(6000..=6800),
        fastrand::u32(0..=200),
    )
}

fn chrome() -> String {
    let (major, build, patch) = chromium_version();
    format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{major}.0.{build}.{patch} Safari/537.36",
        pick(CHROMIUM_PLATFORMS)
    )
}

fn edge() -> String {
    let (major, build, patch) = chromium_version();
    format!(
        "Mozilla/5.0 ({WINDOWS}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{major}.0.{build}.{patch} Safari/537.36 Edg/{major}.0.{build}.{patch}"
    )
}

fn firefox() -> String {
    let version = fastrand::u32(115..=133);
    format!(
        "Mozilla/5.0 ({}; rv:{version}.0) Gecko/20100101 Firefox/{version}.0",
        pick(FIREFOX_PLATFORMS)
    )
}

fn safari() -> String {
    let major = fastrand::u32(15..=18);
    let minor = fastrand::u32(0..=6);
    format!(
        "Mozilla/5.0 ({MACOS}) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{major}.{minor} Safari/605.1.15"
    )
}
