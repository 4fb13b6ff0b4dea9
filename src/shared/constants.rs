pub const APP_NAME: &str = "torikamera";

pub const CONFIG_FILE: &str = "torikamera.config.json";
pub const ERROR_LOG_FILE: &str = "error.log";
pub const DEBUG_LOG_FILE: &str = "debug.log";

pub const DEFAULT_SOURCE_URL: &str = "https://torilive.fi/";
pub const DEFAULT_OUTPUT_DIR: &str = "data/raw";
pub const PORTAL_HOST: &str = "torilive.fi";
pub const YOUTUBE_WATCH_PREFIX: &str = "https://www.youtube.com/watch?v=";
pub const YT_DLP_BIN: &str = "yt-dlp";

pub const FRAME_FILE_PREFIX: &str = "torikamera";

pub const VIEWPORT_WIDTH: u32 = 1920;
pub const VIEWPORT_HEIGHT: u32 = 1080;

pub const VIDEO_SELECTOR: &str = "video";
pub const CONSENT_BUTTON_SELECTOR: &str = "button";
pub const OVERRIDE_STYLE_ID: &str = "torikamera-overrides";

pub const CONSENT_LABELS: &[&str] = &["reject all", "reject", "hylkää kaikki", "hylkää"];

/// Page chrome hidden around the player.
pub const PAGE_CHROME_SELECTORS: &[&str] = &[
    "ytd-masthead",
    "#masthead-container",
    "#secondary",
    "#guide",
    "#comments",
    "#related",
    "ytd-watch-next-secondary-results-renderer",
    "div#placeholder-player",
    "#below",
    "ytd-merch-shelf-renderer",
    "ytd-player-legacy-desktop-watch-ads-renderer",
    "#chat",
];

/// Player overlays drawn on top of the video surface.
pub const PLAYER_CHROME_SELECTORS: &[&str] = &[
    ".ytp-chrome-top",
    ".ytp-chrome-bottom",
    ".ytp-gradient-top",
    ".ytp-gradient-bottom",
    ".ytp-watermark",
    ".ytp-ce-element",
    ".ytp-hover-progress",
    ".ytp-bezel",
    ".ytp-spinner",
    ".ytp-ad-overlay-container",
    ".annotation",
    ".iv-module",
    ".ytp-paid-content-overlay",
    ".ytp-suggested-action",
    "button.ytp-button.ytp-cards-button",
    ".ytp-pause-overlay",
];
